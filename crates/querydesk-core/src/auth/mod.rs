//! Authentication module for maintaining an existing session.
//!
//! This module provides:
//! - `CredentialStore`: the persisted access/refresh token pair
//! - `RefreshOperation`: renews the pair through the public refresh endpoint
//! - `SessionTeardown`: clears the pair and redirects to the login page
//!
//! Tokens are persisted in a JSON file, the OS keychain, or memory.

pub mod credentials;
pub mod refresh;
pub mod storage;
pub mod teardown;

pub use credentials::{
    Credential, CredentialStore, ReplaceOutcome, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
pub use refresh::RefreshOperation;
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, StorageBackend};
pub use teardown::{Navigator, NoNavigation, SessionEvent, SessionTeardown, LOGIN_ROUTE};
