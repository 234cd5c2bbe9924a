//! Core library for matchmate.
//!
//! Holds everything the front ends share:
//!
//! - [`auth`]: the signed-in session, credential storage and token refresh
//! - [`api`]: transport, envelope/error types and the `ApiClient`
//! - [`router`]: route table and navigation guard
//! - [`store`]: in-memory `{logged_in, user}` mirror
//! - [`events`]: session-change notifications
//! - [`models`]: API data types and forms
//! - [`config`]: on-disk configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod models;
pub mod router;
pub mod store;

pub use api::{ApiClient, ApiError};
pub use auth::AuthSession;
pub use config::Config;
pub use events::{AuthEvent, EventBus};
pub use router::{Navigation, Router};
pub use store::{GlobalStore, SessionState};
