//! The session task: applies events to the manager until the session ends.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::backend::SessionBackend;
use super::event::{EndAction, SessionEvent, SessionOutcome};
use super::manager::SessionManager;

/// Result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit {
    /// Clean logout or failure
    pub outcome: SessionOutcome,
    /// Power action requested alongside the logout
    pub action: EndAction,
}

/// Run the session to completion.
///
/// After the Exit phase is reached, events keep being processed for up to
/// `exit_timeout` so that children can quit on their own; whatever is still
/// running afterwards is sent SIGTERM.
pub async fn run<B: SessionBackend>(
    mut manager: SessionManager<B>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    exit_timeout: Duration,
) -> SessionExit {
    manager.start().await;

    while manager.outcome().is_none() {
        match events.recv().await {
            Some(event) => manager.handle_event(event).await,
            None => {
                warn!("Session event channel closed unexpectedly");
                manager.force_exit(SessionOutcome::Failed).await;
            }
        }
    }

    let deadline = Instant::now() + exit_timeout;
    while manager.has_live_children() {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => manager.handle_event(event).await,
            Ok(None) | Err(_) => break,
        }
    }
    let leftover = manager.terminate_remaining();
    if leftover > 0 {
        info!("Sent SIGTERM to {} remaining processes", leftover);
    }

    SessionExit {
        outcome: manager.outcome().unwrap_or(SessionOutcome::Failed),
        action: manager.end_action(),
    }
}
