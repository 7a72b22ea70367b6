//! Turns session events into navigation.
//!
//! The CLI has no screens, so "navigating" prints the destination the
//! application would move to.

use authkeep_core::{Destination, SessionEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Listen for session events until the manager goes away
pub fn spawn(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<Vec<Destination>> {
    tokio::spawn(async move {
        let mut visited = Vec::new();
        loop {
            match events.recv().await {
                Ok(event) => visited.push(navigate(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Router fell behind session events");
                }
                Err(RecvError::Closed) => break,
            }
        }
        visited
    })
}

fn navigate(event: &SessionEvent) -> Destination {
    let destination = event.destination();
    info!(destination = %destination, "Navigating");
    println!("-> {}", destination);
    destination
}
