//! API client for communicating with the QueryDesk REST API.
//!
//! Every call goes through the same pipeline: the request augmenter attaches
//! the bearer token, the transport sends it, and the refresh coordinator
//! turns an expired-token response into a refresh plus one replay.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{
    ApiError, ApiResponse, CoordinatorState, HttpTransport, OutboundRequest, RefreshCoordinator,
    RequestAugmenter,
};
use crate::auth::{CredentialStore, Navigator, RefreshOperation, SessionTeardown};
use crate::config::Config;

/// Authenticated client for the QueryDesk API.
/// Clone is cheap and clones share the credential store and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    store: Arc<CredentialStore>,
    augmenter: RequestAugmenter,
    transport: HttpTransport,
    coordinator: RefreshCoordinator,
    teardown: SessionTeardown,
}

impl ApiClient {
    /// Create a client for the configured API.
    pub fn new(
        config: &Config,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.base_url(), config.request_timeout())?;
        let augmenter = RequestAugmenter::new(Arc::clone(&store));
        let teardown = SessionTeardown::new(Arc::clone(&store), navigator);
        let refresher =
            RefreshOperation::new(Arc::clone(&store), augmenter.clone(), transport.clone());
        let coordinator = RefreshCoordinator::new(
            refresher,
            augmenter.clone(),
            transport.clone(),
            teardown.clone(),
        );

        Ok(Self {
            store,
            augmenter,
            transport,
            coordinator,
            teardown,
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// Send a request and return the raw successful response.
    pub async fn execute(&self, request: OutboundRequest) -> Result<ApiResponse, ApiError> {
        let request = self.augmenter.augment(request)?;
        debug!(method = %request.method(), path = request.path(), "Sending request");
        let response = self.transport.send(&request).await?;
        self.coordinator.settle(request, response).await
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: OutboundRequest) -> Result<T, ApiError> {
        self.execute(request).await?.json()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_json(OutboundRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_json(OutboundRequest::post(path).with_json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_json(OutboundRequest::put(path).with_json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_json(OutboundRequest::patch(path).with_json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_json(OutboundRequest::delete(path)).await
    }

    /// End the session: clear stored tokens and redirect to login.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.teardown.logout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStorage, NoNavigation};

    fn client() -> ApiClient {
        let store = CredentialStore::shared(Box::new(MemoryStorage::new())).unwrap();
        ApiClient::new(&Config::default(), store, Arc::new(NoNavigation)).unwrap()
    }

    #[test]
    fn test_new_client_is_idle() {
        let client = client();
        assert_eq!(client.base_url(), "http://localhost:8080/api");
        assert_eq!(client.coordinator_state(), CoordinatorState::Idle);
        assert!(!client.store().is_authenticated());
    }

    #[tokio::test]
    async fn test_protected_call_without_session_is_missing_credential() {
        let client = client();
        let result: Result<serde_json::Value, _> = client.get("/queries").await;
        assert_eq!(result.unwrap_err(), ApiError::MissingCredential);
    }

    #[test]
    fn test_logout_without_session_is_noop() {
        assert!(client().logout().is_ok());
    }
}
