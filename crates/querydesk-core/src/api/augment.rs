use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::debug;

use super::{endpoints, ApiError, OutboundRequest};
use crate::auth::CredentialStore;

/// Pre-flight step applied to every outbound request.
#[derive(Clone)]
pub struct RequestAugmenter {
    store: Arc<CredentialStore>,
}

impl RequestAugmenter {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Stamp the request and attach the bearer token.
    ///
    /// Public endpoints never carry a token. A protected request with no
    /// stored token fails here with `MissingCredential`, before any network
    /// call. A replay keeps the token it was built with.
    pub fn augment(&self, mut request: OutboundRequest) -> Result<OutboundRequest, ApiError> {
        request.set_timestamp(&request_timestamp())?;

        if endpoints::is_public(request.path()) {
            request.clear_bearer();
            return Ok(request);
        }

        if request.is_retried() {
            return Ok(request);
        }

        let token = self.store.access_token().ok_or_else(|| {
            debug!(path = request.path(), "Protected request without an access token");
            ApiError::MissingCredential
        })?;
        request.set_bearer(&token)?;
        Ok(request)
    }
}

fn request_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::REQUEST_TIMESTAMP_HEADER;
    use crate::auth::{Credential, MemoryStorage};
    use reqwest::header::{HeaderValue, AUTHORIZATION};

    fn store_with(credential: Option<Credential>) -> Arc<CredentialStore> {
        let store = CredentialStore::shared(Box::new(MemoryStorage::new())).unwrap();
        if let Some(credential) = credential {
            store.replace(credential).unwrap();
        }
        store
    }

    #[test]
    fn test_protected_request_gets_bearer_and_timestamp() {
        let augmenter = RequestAugmenter::new(store_with(Some(Credential::new("A1", "R1"))));
        let request = augmenter.augment(OutboundRequest::get("/queries")).unwrap();

        assert_eq!(request.bearer_token(), Some("A1"));
        let stamp = request.headers().get(REQUEST_TIMESTAMP_HEADER).unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(stamp.to_str().unwrap());
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_public_request_never_carries_token() {
        let augmenter = RequestAugmenter::new(store_with(Some(Credential::new("A1", "R1"))));
        let request = OutboundRequest::post("/public/login")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        let request = augmenter.augment(request).unwrap();

        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert!(request.headers().get(REQUEST_TIMESTAMP_HEADER).is_some());
    }

    #[test]
    fn test_missing_credential_fails_fast() {
        let augmenter = RequestAugmenter::new(store_with(None));
        let result = augmenter.augment(OutboundRequest::get("/profile"));
        assert_eq!(result.unwrap_err(), ApiError::MissingCredential);
    }

    #[test]
    fn test_public_request_allowed_without_credential() {
        let augmenter = RequestAugmenter::new(store_with(None));
        assert!(augmenter.augment(OutboundRequest::post("/forgot-password")).is_ok());
    }

    #[test]
    fn test_replay_keeps_its_own_token() {
        let augmenter = RequestAugmenter::new(store_with(None));
        let replay = OutboundRequest::get("/queries").into_replay("A2").unwrap();
        let replay = augmenter.augment(replay).unwrap();
        assert_eq!(replay.bearer_token(), Some("A2"));
        assert!(replay.is_retried());
    }
}
