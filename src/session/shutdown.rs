//! Logout and session exit.

use tracing::{debug, error, info, warn};

use super::backend::{ClientSignal, OutboundSignal, SessionBackend};
use super::event::{EndAction, SessionOutcome};
use super::inhibitor::InhibitFlag;
use super::manager::SessionManager;
use super::phase::SessionPhase;
use crate::error::{Result, SessionError};

/// `Logout` mode that ignores inhibitors.
pub const LOGOUT_MODE_FORCE: u32 = 2;

/// End-session flag telling clients the logout cannot be refused.
pub const END_SESSION_FLAG_FORCEFUL: u32 = 1;

impl<B: SessionBackend> SessionManager<B> {
    /// Ask every registered client whether the session may end.
    pub async fn query_end_session(&mut self, force: bool) {
        let phase = self.sequencer.current();
        if phase.is_ending() {
            debug!("Session already ending ({}), ignoring logout request", phase);
            return;
        }
        let flags = if force { END_SESSION_FLAG_FORCEFUL } else { 0 };
        self.sequencer.set_end_session_flags(flags);
        self.run_phase(SessionPhase::QueryEndSession).await;
        self.try_advance().await;
    }

    /// Handle `Logout(mode)`.
    pub async fn logout(&mut self, mode: u32) -> Result<()> {
        self.request_end(EndAction::Logout, mode == LOGOUT_MODE_FORCE)
            .await
    }

    /// Start ending the session, then run `action`.
    ///
    /// Without `force`, an active logout inhibitor refuses the request.
    pub async fn request_end(&mut self, action: EndAction, force: bool) -> Result<()> {
        if !force && self.inhibitors.is_inhibited(InhibitFlag::Logout as u32) {
            warn!("{:?} requested but logout is inhibited", action);
            return Err(SessionError::NotAllowed(
                "logout is inhibited by a running application".to_string(),
            ));
        }
        if !self.sequencer.current().is_ending() {
            self.end_action = action;
        }
        self.query_end_session(force).await;
        Ok(())
    }

    pub(crate) async fn broadcast_end_session(&mut self, phase: SessionPhase) {
        let flags = self.sequencer.end_session_flags();
        let signal = match phase {
            SessionPhase::QueryEndSession => ClientSignal::QueryEndSession(flags),
            _ => ClientSignal::EndSession(flags),
        };

        let ids = self.clients.registered_ids();
        for id in &ids {
            self.signal_client(id, signal).await;
        }
        info!("Sent {:?} to {} clients", signal, ids.len());
        self.sequencer.await_responses(ids);
    }

    async fn signal_client(&mut self, startup_id: &str, signal: ClientSignal) -> bool {
        let Some(client) = self.clients.get(startup_id) else {
            return false;
        };
        let (Some(destination), Some(path)) = (client.dbus_name(), client.object_path()) else {
            return false;
        };
        let outbound = OutboundSignal::Client {
            destination: destination.to_string(),
            path: path.to_string(),
            signal,
        };
        self.backend.emit(outbound).await;
        true
    }

    /// Handle `ClientPrivate.EndSessionResponse`.
    ///
    /// Each client's first response during QueryEndSession/EndSession counts;
    /// repeats and responses outside those phases are ignored.
    pub async fn end_session_response(&mut self, startup_id: &str, is_ok: bool, reason: &str) {
        let phase = self.sequencer.current();
        if !matches!(
            phase,
            SessionPhase::QueryEndSession | SessionPhase::EndSession
        ) || !self.sequencer.record_response(startup_id)
        {
            debug!("Ignoring unexpected end-session response from {}", startup_id);
            return;
        }
        if phase == SessionPhase::EndSession {
            if let Some(client) = self.clients.get_mut(startup_id) {
                client.finished = true;
            }
        }

        if !is_ok {
            let name = self
                .clients
                .get(startup_id)
                .map(|c| c.best_name().to_string())
                .unwrap_or_else(|| startup_id.to_string());
            if phase == SessionPhase::QueryEndSession
                && self.config.shutdown.honor_end_session_refusal
            {
                info!("{} refused to end the session ({}), cancelling", name, reason);
                self.cancel_end_session().await;
                return;
            }
            warn!(
                "{} refused to end the session ({}), continuing anyway",
                name, reason
            );
        }
        self.try_advance().await;
    }

    /// Abandon a logout that is still in QueryEndSession.
    pub async fn cancel_end_session(&mut self) {
        if self.sequencer.current() != SessionPhase::QueryEndSession {
            return;
        }
        let signal = ClientSignal::CancelEndSession(self.sequencer.end_session_flags());
        for id in self.clients.registered_ids() {
            self.signal_client(&id, signal).await;
        }
        self.end_action = EndAction::Logout;
        self.run_phase(SessionPhase::Running).await;
    }

    /// End the session immediately, skipping the logout handshake.
    pub async fn force_exit(&mut self, outcome: SessionOutcome) {
        if self.outcome.is_some() {
            return;
        }
        if outcome == SessionOutcome::Failed {
            error!("Session failed, exiting");
        }
        self.outcome = Some(outcome);
        self.run_phase(SessionPhase::Exit).await;
    }

    /// Handle `SessionManager.Setenv`.
    pub fn setenv(&mut self, variable: &str, value: &str) -> Result<()> {
        if !self.sequencer.current().is_startup() {
            return Err(SessionError::NotAllowed(
                "Setenv is only available during startup".to_string(),
            ));
        }
        if variable.is_empty() || variable.contains('=') {
            return Err(SessionError::InvalidArgument(format!(
                "invalid environment variable name {:?}",
                variable
            )));
        }
        self.environment.retain(|(name, _)| name != variable);
        self.environment
            .push((variable.to_string(), value.to_string()));
        debug!("Setenv {}={}", variable, value);
        Ok(())
    }

    /// Handle `SessionManager.InitializationError`.
    pub async fn initialization_error(&mut self, message: &str, fatal: bool) {
        if fatal && self.sequencer.current().is_startup() {
            error!("Fatal initialization error: {}", message);
            self.force_exit(SessionOutcome::Failed).await;
        } else {
            warn!("Initialization error: {}", message);
        }
    }

    /// Handle `Client.Stop`.
    pub async fn stop_client(&mut self, startup_id: &str) -> Result<()> {
        if self.signal_client(startup_id, ClientSignal::Stop).await {
            return Ok(());
        }
        match self.clients.get(startup_id).and_then(|c| c.signalable_pid()) {
            Some(pid) => {
                self.backend.terminate(pid);
                Ok(())
            }
            None => Err(SessionError::NotAllowed(format!(
                "client {} has no process to stop",
                startup_id
            ))),
        }
    }

    /// Whether any spawned child is still being waited on.
    pub fn has_live_children(&self) -> bool {
        self.clients.iter().any(|c| c.child_watch.is_some())
    }

    /// SIGTERM every leftover child and registered peer. Returns how many were signalled.
    pub fn terminate_remaining(&mut self) -> usize {
        let pids: Vec<u32> = self
            .clients
            .iter()
            .filter_map(|c| c.signalable_pid())
            .collect();
        for pid in &pids {
            warn!("Terminating leftover process {}", pid);
            self.backend.terminate(*pid);
        }
        pids.len()
    }
}
