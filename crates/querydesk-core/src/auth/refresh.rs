use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Credential, CredentialStore, ReplaceOutcome};
use crate::api::endpoints::REFRESH_PATH;
use crate::api::{ApiError, HttpTransport, OutboundRequest, RequestAugmenter};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    data: RefreshedTokens,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshedTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges the stored refresh token for a new credential pair.
#[derive(Clone)]
pub struct RefreshOperation {
    store: Arc<CredentialStore>,
    augmenter: RequestAugmenter,
    transport: HttpTransport,
}

impl RefreshOperation {
    pub fn new(
        store: Arc<CredentialStore>,
        augmenter: RequestAugmenter,
        transport: HttpTransport,
    ) -> Self {
        Self {
            store,
            augmenter,
            transport,
        }
    }

    /// Perform one refresh call.
    ///
    /// On success the new pair is in the store before this returns. A 401
    /// (or no refresh token at all) is `RefreshRejected`; everything else
    /// that goes wrong is `RefreshTransportError`.
    ///
    /// If the store was written while the call was in flight (a logout, or a
    /// session imported elsewhere) the new pair is dropped. The caller then
    /// gets whatever the store holds now, or `RefreshRejected` if it is empty.
    pub async fn run(&self) -> Result<Credential, ApiError> {
        let (current, generation) = self.store.snapshot();
        let refresh_token = current.map(|c| c.refresh_token).ok_or_else(|| {
            debug!("No refresh token stored");
            ApiError::RefreshRejected
        })?;

        let request = OutboundRequest::post(REFRESH_PATH)
            .with_json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .and_then(|r| self.augmenter.augment(r))
            .map_err(transient)?;

        let response = self.transport.send(&request).await.map_err(transient)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::RefreshRejected);
        }
        if !response.is_success() {
            return Err(transient(ApiError::from_status(
                response.status(),
                response.text(),
            )));
        }

        let body: RefreshResponse = response.json().map_err(transient)?;
        let credential = Credential::new(
            body.data.access_token,
            body.data.refresh_token.unwrap_or(refresh_token),
        );
        match self
            .store
            .replace_if_unchanged(credential.clone(), generation)
            .map_err(transient)?
        {
            ReplaceOutcome::Replaced => {
                info!("Access token refreshed");
                Ok(credential)
            }
            ReplaceOutcome::Superseded(Some(current)) => {
                info!("Session changed during refresh, keeping the newer credential");
                Ok(current)
            }
            ReplaceOutcome::Superseded(None) => {
                info!("Session ended during refresh, discarding refreshed tokens");
                Err(ApiError::RefreshRejected)
            }
        }
    }
}

fn transient(err: ApiError) -> ApiError {
    match err {
        ApiError::RefreshTransportError(_) | ApiError::RefreshRejected => err,
        other => ApiError::RefreshTransportError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_request_body_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "R1" }).unwrap();
        assert_eq!(body, serde_json::json!({ "refreshToken": "R1" }));
    }

    #[test]
    fn test_refresh_response_without_new_refresh_token() {
        let parsed: RefreshResponse =
            serde_json::from_str(r#"{"data":{"accessToken":"A2"}}"#).unwrap();
        assert_eq!(parsed.data.access_token, "A2");
        assert!(parsed.data.refresh_token.is_none());
    }

    #[test]
    fn test_transient_wraps_other_errors() {
        assert_eq!(transient(ApiError::Timeout), ApiError::RefreshTransportError("Request timed out".to_string()));
        assert_eq!(transient(ApiError::RefreshRejected), ApiError::RefreshRejected);
    }
}
