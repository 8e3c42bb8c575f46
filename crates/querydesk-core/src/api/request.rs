//! Outbound request description shared by the augmenter, transport and
//! refresh coordinator.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;

use super::ApiError;

/// Diagnostic header attached to every request.
pub const REQUEST_TIMESTAMP_HEADER: &str = "x-request-timestamp";

/// A request as issued by the data layer, before and after augmentation.
///
/// `retried` is only ever set by [`OutboundRequest::into_replay`], so a
/// request can be replayed at most once.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Bearer token currently attached, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Build the one-shot replay of this request carrying a fresh token.
    pub fn into_replay(mut self, access_token: &str) -> Result<Self, ApiError> {
        self.set_bearer(access_token)?;
        self.retried = true;
        Ok(self)
    }

    pub(crate) fn set_bearer(&mut self, access_token: &str) -> Result<(), ApiError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| ApiError::InvalidRequest("Access token is not a valid header value".to_string()))?;
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }

    pub(crate) fn clear_bearer(&mut self) {
        self.headers.remove(header::AUTHORIZATION);
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: &str) -> Result<(), ApiError> {
        let value = HeaderValue::from_str(timestamp)
            .map_err(|_| ApiError::InvalidRequest("Invalid timestamp header".to_string()))?;
        self.headers
            .insert(HeaderName::from_static(REQUEST_TIMESTAMP_HEADER), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_is_not_retried() {
        let req = OutboundRequest::get("/queries");
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.path(), "/queries");
        assert!(!req.is_retried());
        assert!(req.bearer_token().is_none());
    }

    #[test]
    fn test_into_replay_sets_marker_and_token() {
        let mut req = OutboundRequest::get("/queries");
        req.set_bearer("A1").unwrap();
        assert_eq!(req.bearer_token(), Some("A1"));

        let replay = req.into_replay("A2").unwrap();
        assert!(replay.is_retried());
        assert_eq!(replay.bearer_token(), Some("A2"));
        assert_eq!(replay.headers().get_all(header::AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_with_json_and_query() {
        let req = OutboundRequest::post("/queries")
            .with_json(&serde_json::json!({ "title": "Printer offline" }))
            .unwrap()
            .with_query("page", "2");
        assert_eq!(req.body().unwrap()["title"], "Printer offline");
        assert_eq!(req.query(), &[("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let mut req = OutboundRequest::get("/queries");
        assert!(matches!(
            req.set_bearer("bad\ntoken"),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
