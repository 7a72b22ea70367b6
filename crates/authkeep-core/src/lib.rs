//! authkeep core - client-side session management.
//!
//! Keeps the signed-in user in memory, persists the bearer credential across
//! restarts, and talks to the identity service for login, registration and
//! session hydration.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, IdentityClient};
pub use auth::{
    Destination, FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionError,
    SessionEvent, SessionManager, TokenStore,
};
pub use config::Config;
pub use models::{SessionState, User};
