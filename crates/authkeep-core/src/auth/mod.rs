//! Session lifecycle and credential storage.
//!
//! This module provides:
//! - `SessionManager`: hydrate, login, logout and register against the identity service
//! - `TokenStore`: the single persisted credential slot, with file, keyring and memory backends
//! - `SessionEvent`: transitions the application routes on
//!
//! The credential is written on login, read once at startup and removed on logout.

pub mod events;
pub mod keychain;
pub mod session;
pub mod store;

pub use events::{Destination, SessionEvent};
pub use keychain::KeyringTokenStore;
pub use session::{SessionError, SessionManager};
pub use store::{FileTokenStore, MemoryTokenStore, StoredCredential, TokenStore, TOKEN_KEY};
