//! QueryDesk client core.
//!
//! Authenticated HTTP access to the QueryDesk API: credential storage,
//! bearer token attachment, single-flight token refresh with replay of the
//! requests that hit an expired token, and session teardown when the refresh
//! token itself is rejected.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError, ApiResponse, CoordinatorState, OutboundRequest};
pub use auth::{Credential, CredentialStore, Navigator, SessionEvent};
pub use config::Config;
