use thiserror::Error;

/// Errors surfaced by the authenticated client.
///
/// `Clone` so a single refresh failure can be handed to every waiter queued
/// behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("No stored access token for a protected request")]
    MissingCredential,

    #[error("Unauthorized - token may be expired")]
    AuthExpired,

    #[error("Unauthorized after token refresh")]
    AuthExpiredRetryExhausted,

    #[error("Refresh token rejected - please log in again")]
    RefreshRejected,

    #[error("Token refresh failed: {0}")]
    RefreshTransportError(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a server-provided message out of a JSON error body, falling back
    /// to the (truncated) raw body.
    fn extract_message(body: &str) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            for key in ["message", "error"] {
                if let Some(msg) = value.get(key).and_then(|m| m.as_str()) {
                    return Self::truncate_body(msg);
                }
            }
        }
        Self::truncate_body(body)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        match status.as_u16() {
            401 => ApiError::AuthExpired,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            400..=499 => ApiError::ValidationError(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Classify a transport-level failure. Timeouts are kept apart so they
    /// never look like an authentication problem.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }

    /// Normalized text for display to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::MissingCredential => "You are not signed in.".to_string(),
            ApiError::AuthExpired | ApiError::AuthExpiredRetryExhausted => {
                "Your session is no longer valid for this request.".to_string()
            }
            ApiError::RefreshRejected => "Your session has expired. Please log in again.".to_string(),
            ApiError::RefreshTransportError(_) => {
                "Could not renew your session. Please try again.".to_string()
            }
            ApiError::AccessDenied(_) => "You do not have permission to do that.".to_string(),
            ApiError::NotFound(_) => "The requested item was not found.".to_string(),
            ApiError::ValidationError(msg) if !msg.is_empty() => msg.clone(),
            ApiError::ValidationError(_) => "The request was not valid.".to_string(),
            ApiError::RateLimited => "Too many requests. Please wait a moment.".to_string(),
            ApiError::ServerError(_) => "The server encountered an error. Please try again later.".to_string(),
            ApiError::NetworkError(_) => "Unable to reach the server. Check your connection.".to_string(),
            ApiError::Timeout => "The request timed out. Please try again.".to_string(),
            ApiError::InvalidResponse(_) => "The server sent an unexpected response.".to_string(),
            ApiError::InvalidRequest(msg) => format!("The request could not be built: {}", msg),
            ApiError::Storage(_) => "Could not access stored credentials.".to_string(),
        }
    }

    /// Only a rejected refresh token forces the user back to the login page.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::RefreshRejected)
    }

    /// Whether retrying the same action later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RefreshTransportError(_)
                | ApiError::RateLimited
                | ApiError::ServerError(_)
                | ApiError::NetworkError(_)
                | ApiError::Timeout
        )
    }
}
