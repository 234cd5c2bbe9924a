//! Authentication module for managing the signed-in session.
//!
//! This module provides:
//! - `AuthSession`: login, registration, logout and the token-refreshing request pipeline
//! - `RefreshCoordinator`: single-flight access-token refresh
//! - `CredentialStore`: persistent token storage (memory, JSON file, OS keychain)

pub mod credentials;
pub mod refresh;
pub mod session;

pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
pub use refresh::RefreshCoordinator;
pub use session::AuthSession;
