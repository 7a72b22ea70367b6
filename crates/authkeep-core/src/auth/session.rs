use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, IdentityClient};
use crate::models::{SessionState, User};

use super::events::SessionEvent;
use super::store::TokenStore;

/// Events buffered per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to save credential: {0}")]
    Store(String),

    #[error("Superseded by a newer session change")]
    Superseded,
}

impl SessionError {
    /// The service's message when registration hit an existing account
    pub fn conflict_message(&self) -> Option<&str> {
        match self {
            SessionError::Api(ApiError::Conflict(msg)) => Some(msg),
            _ => None,
        }
    }
}

/// Counters guarding overlapping transitions.
///
/// `session` advances whenever the stored credential changes hands (a login
/// saving its token, a logout). `login` advances on every login attempt so
/// only the most recent one may save its token; once saved, a login is
/// superseded only by a later change to the session.
#[derive(Debug, Default)]
struct Generations {
    session: u64,
    login: u64,
}

/// Owns the current user and the persisted credential.
///
/// Results are applied only while the session generation they started from
/// is still current. A failed login never advances it, so it cannot discard
/// a hydration that is still in flight.
pub struct SessionManager {
    client: IdentityClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    generations: Mutex<Generations>,
}

impl SessionManager {
    pub fn new(client: IdentityClient, store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            store,
            state,
            events,
            generations: Mutex::new(Generations::default()),
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every state change
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Receiver for lifecycle events (the router listens here)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Rebuild the session from the stored credential.
    ///
    /// Never fails: any problem leaves the session `Anonymous`. A credential
    /// the service rejects outright (401/403) is purged; one that merely could
    /// not be checked is kept for the next start.
    pub async fn hydrate(&self) {
        let generation = self.lock_generations().session;

        let token = match self.store.get() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored credential, starting anonymous");
                self.apply(generation, None);
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                self.apply(generation, None);
                return;
            }
        };

        match self.client.me(&token).await {
            Ok(user) => {
                if self.apply(generation, user) {
                    info!(authenticated = self.is_authenticated(), "Session hydrated");
                }
            }
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "Session hydration failed");
                let guard = self.lock_generations();
                if guard.session != generation {
                    debug!("Hydration result discarded, session changed meanwhile");
                    return;
                }
                if e.is_auth_rejection() {
                    info!("Stored credential rejected, removing it");
                    if let Err(e) = self.store.remove() {
                        warn!(error = %e, "Failed to remove rejected credential");
                    }
                }
                self.state.send_replace(SessionState::Anonymous);
            }
        }
    }

    /// Run `hydrate` in the background so startup does not wait on the network
    pub fn spawn_hydrate(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.hydrate().await })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Log in and fetch the canonical user for the new token.
    ///
    /// On error the session and the stored credential are as they were before
    /// the call. The error's `Display` is the message to show the user.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let (attempt, started_in) = {
            let mut guard = self.lock_generations();
            guard.login += 1;
            (guard.login, guard.session)
        };

        let token = match self.client.login(username, password).await {
            Ok(token) => token,
            Err(e) => {
                info!(error = %e, "Login rejected");
                return Err(e.into());
            }
        };

        let (generation, previous) = {
            let mut guard = self.lock_generations();
            if guard.login != attempt || guard.session != started_in {
                debug!("Login superseded before saving credential");
                return Err(SessionError::Superseded);
            }
            let previous = self.store.get().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read previous credential");
                None
            });
            self.store
                .set(&token)
                .map_err(|e| SessionError::Store(format!("{:#}", e)))?;
            guard.session += 1;
            (guard.session, previous)
        };

        let user = match self.client.me(&token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to fetch user after login");
                self.restore_credential(generation, previous);
                return Err(e.into());
            }
        };

        let guard = self.lock_generations();
        if guard.session != generation {
            debug!("Login superseded before applying user");
            return Err(SessionError::Superseded);
        }
        self.state.send_replace(SessionState::from_user(user.clone()));
        info!(has_user = user.is_some(), "Login successful");
        self.emit(SessionEvent::LoggedIn(user));
        Ok(())
    }

    /// Create an account. The session is not touched; the new user still has
    /// to log in.
    pub async fn register(&self, payload: &Value) -> Result<(), SessionError> {
        match self.client.register(payload).await {
            Ok(()) => {
                info!("Registration accepted");
                self.emit(SessionEvent::Registered);
                Ok(())
            }
            Err(e) => {
                info!(error = %e, "Registration failed");
                Err(e.into())
            }
        }
    }

    /// Forget the credential and the user. Safe to call when already anonymous.
    pub fn logout(&self) {
        let mut guard = self.lock_generations();
        guard.session += 1;
        if let Err(e) = self.store.remove() {
            warn!(error = %e, "Failed to remove stored credential");
        }
        self.state.send_replace(SessionState::Anonymous);
        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lock_generations(&self) -> MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the state if `generation` is still current. Returns whether it was.
    fn apply(&self, generation: u64, user: Option<User>) -> bool {
        let guard = self.lock_generations();
        if guard.session != generation {
            debug!("Stale session result discarded");
            return false;
        }
        self.state.send_replace(SessionState::from_user(user));
        true
    }

    fn restore_credential(&self, generation: u64, previous: Option<String>) {
        let guard = self.lock_generations();
        if guard.session != generation {
            return;
        }
        let result = match previous {
            Some(ref token) => self.store.set(token),
            None => self.store.remove(),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to restore previous credential");
        }
    }

    /// Called with the generation lock held so subscribers see events in the
    /// same order as the state changes. `broadcast::send` never blocks.
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No subscribers for session event");
        }
    }
}
