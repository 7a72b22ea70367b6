//! Data models shared between the identity client and the session manager.
//!
//! - `User`: the authenticated principal, passed through verbatim
//! - `SessionState`: `Anonymous` or `Authenticated(User)`

pub mod session_state;
pub mod user;

pub use session_state::SessionState;
pub use user::User;
