use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::StorageBackend;
use crate::api::ApiError;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Access/refresh token pair for an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Sole owner of the current credential.
///
/// The pair is either fully present or fully absent. Writes hit the backend
/// first and are then published in memory under the write lock, so a reader
/// never observes one token from the old pair and one from the new, and
/// memory never drifts from what is persisted.
///
/// Every write bumps a generation number. A writer that started from an
/// older generation (a refresh racing a logout) can detect that and back off
/// with [`CredentialStore::replace_if_unchanged`].
pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    slot: RwLock<Slot>,
}

struct Slot {
    credential: Option<Credential>,
    generation: u64,
}

/// Result of a conditional replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The store changed since the caller's snapshot; carries what it holds now.
    Superseded(Option<Credential>),
}

impl CredentialStore {
    /// Load whatever the backend holds. A half-present pair counts as empty.
    pub fn open(backend: Box<dyn StorageBackend>) -> Result<Self, ApiError> {
        let access = backend.get(ACCESS_TOKEN_KEY).map_err(storage_error)?;
        let refresh = backend.get(REFRESH_TOKEN_KEY).map_err(storage_error)?;

        let credential = match (access, refresh) {
            (Some(access), Some(refresh)) => Some(Credential::new(access, refresh)),
            (None, None) => None,
            _ => {
                warn!("Stored credential is incomplete, ignoring it");
                None
            }
        };
        debug!(authenticated = credential.is_some(), "Credential store opened");

        Ok(Self {
            backend,
            slot: RwLock::new(Slot {
                credential,
                generation: 0,
            }),
        })
    }

    /// Convenience for sharing one store between client components.
    pub fn shared(backend: Box<dyn StorageBackend>) -> Result<Arc<Self>, ApiError> {
        Self::open(backend).map(Arc::new)
    }

    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    /// Current credential together with the generation it belongs to.
    pub fn snapshot(&self) -> (Option<Credential>, u64) {
        let slot = self.read();
        (slot.credential.clone(), slot.generation)
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().credential.as_ref().map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().credential.as_ref().map(|c| c.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().credential.is_some()
    }

    /// Replace the stored pair.
    pub fn replace(&self, credential: Credential) -> Result<(), ApiError> {
        let mut slot = self.write();
        self.persist(&mut slot, credential)
    }

    /// Replace the stored pair only if nothing has written to the store
    /// since `generation` was observed.
    pub fn replace_if_unchanged(
        &self,
        credential: Credential,
        generation: u64,
    ) -> Result<ReplaceOutcome, ApiError> {
        let mut slot = self.write();
        if slot.generation != generation {
            return Ok(ReplaceOutcome::Superseded(slot.credential.clone()));
        }
        self.persist(&mut slot, credential)?;
        Ok(ReplaceOutcome::Replaced)
    }

    fn persist(&self, slot: &mut Slot, credential: Credential) -> Result<(), ApiError> {
        self.backend
            .set_many(&[
                (ACCESS_TOKEN_KEY, credential.access_token.as_str()),
                (REFRESH_TOKEN_KEY, credential.refresh_token.as_str()),
            ])
            .map_err(storage_error)?;
        slot.credential = Some(credential);
        slot.generation += 1;
        Ok(())
    }

    /// Remove both tokens. Returns false if the store was already empty.
    ///
    /// The in-memory pair is only dropped once the backend removal succeeded,
    /// so a failed clear leaves the store exactly as it was.
    pub fn clear(&self) -> Result<bool, ApiError> {
        let mut slot = self.write();
        self.backend
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .map_err(storage_error)?;
        slot.generation += 1;
        Ok(slot.credential.take().is_some())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Slot> {
        // A poisoned lock still holds a consistent pair: writers only assign whole values
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn storage_error(err: anyhow::Error) -> ApiError {
    ApiError::Storage(format!("{:#}", err))
}
