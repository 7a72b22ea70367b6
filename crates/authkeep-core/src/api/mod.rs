//! REST client module for the identity service.
//!
//! This module provides the `IdentityClient` for the login, registration and
//! "who am I" calls, and the `ApiError` type those calls fail with.
//!
//! Authenticated calls carry the credential as a bearer token.

pub mod client;
pub mod error;

pub use client::{IdentityClient, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
