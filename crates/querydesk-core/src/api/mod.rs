//! REST API client module for QueryDesk services.
//!
//! This module provides the `ApiClient` for communicating with the
//! QueryDesk API, together with the pieces it is assembled from.
//!
//! The API uses bearer token authentication. Expired access tokens are
//! renewed through the public refresh endpoint and the failed requests are
//! replayed once.

pub mod augment;
pub mod client;
pub mod coordinator;
pub mod endpoints;
pub mod error;
pub mod request;
pub mod transport;

pub use augment::RequestAugmenter;
pub use client::ApiClient;
pub use coordinator::{CoordinatorState, RefreshCoordinator};
pub use endpoints::is_public;
pub use error::ApiError;
pub use request::OutboundRequest;
pub use transport::{ApiResponse, HttpTransport};
