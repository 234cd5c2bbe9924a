//! REST API layer for the matchmate service.
//!
//! This module provides the transport capability, the response envelope and
//! error types, and the `ApiClient` for profile, search, favourite and match
//! endpoints. Every request is sent through the auth session so bearer
//! tokens are attached and refreshed transparently.

pub mod client;
pub mod envelope;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use envelope::{Envelope, FieldErrors};
pub use error::ApiError;
pub use transport::{HttpTransport, ReqwestTransport, Request, Response, TransportError};
