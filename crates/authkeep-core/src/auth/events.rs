use std::fmt;

use serde::Serialize;

use crate::models::User;

/// Lifecycle transitions announced by the session manager.
///
/// The manager never routes; a subscriber turns these into navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "user", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Login succeeded. Carries the fetched user, which may be absent.
    LoggedIn(Option<User>),
    LoggedOut,
    Registered,
}

/// Logical navigation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Home,
    Profile,
    Success,
}

impl SessionEvent {
    pub fn destination(&self) -> Destination {
        match self {
            SessionEvent::LoggedIn(_) => Destination::Profile,
            SessionEvent::LoggedOut => Destination::Home,
            SessionEvent::Registered => Destination::Success,
        }
    }
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Home => "home",
            Destination::Profile => "profile",
            Destination::Success => "success",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
