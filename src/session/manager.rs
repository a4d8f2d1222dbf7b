//! Session manager context
//!
//! [`SessionManager`] owns every piece of session state: the client and
//! inhibitor registries, the phase sequencer, the pending autostart entries
//! and the backend. It is driven by a single task (see
//! [`driver`](super::driver)), so none of its state needs locking.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backend::{OutboundSignal, SessionBackend};
use super::client::inhibitor_object_path;
use super::event::{
    ClientInfo, EndAction, InhibitorInfo, SessionEvent, SessionOutcome, SessionProperties,
    SessionRequest,
};
use super::inhibitor::{InhibitFlag, Inhibitor, InhibitorRegistry};
use super::phase::{PhaseSequencer, SessionPhase};
use super::registry::{ClientQuery, ClientRegistry};
use crate::autostart::AutostartEntry;
use crate::config::Config;

/// Restart style hint reported for clients that are restarted after a crash.
pub const RESTART_STYLE_IF_CRASHED: u32 = 3;

/// The session context object.
pub struct SessionManager<B> {
    pub(crate) config: Arc<Config>,
    pub(crate) backend: B,
    pub(crate) clients: ClientRegistry,
    pub(crate) inhibitors: InhibitorRegistry,
    pub(crate) sequencer: PhaseSequencer,
    pub(crate) autostarts: Vec<AutostartEntry>,
    pub(crate) environment: Vec<(String, String)>,
    pub(crate) next_launch_token: u64,
    pub(crate) outcome: Option<SessionOutcome>,
    pub(crate) end_action: EndAction,
}

impl<B: SessionBackend> SessionManager<B> {
    /// Create a manager in the Startup phase with the given autostart entries pending.
    pub fn new(config: Arc<Config>, backend: B, autostarts: Vec<AutostartEntry>) -> Self {
        Self {
            clients: ClientRegistry::new(config.session.match_policy),
            inhibitors: InhibitorRegistry::new(),
            sequencer: PhaseSequencer::new(config.phases.clone()),
            config,
            backend,
            autostarts,
            environment: Vec::new(),
            next_launch_token: 0,
            outcome: None,
            end_action: EndAction::Logout,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.sequencer.current()
    }

    /// Tracked clients.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Active inhibitors.
    pub fn inhibitors(&self) -> &InhibitorRegistry {
        &self.inhibitors
    }

    /// Phase sequencer state.
    pub fn sequencer(&self) -> &PhaseSequencer {
        &self.sequencer
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Autostart entries not yet launched.
    pub fn pending_autostarts(&self) -> &[AutostartEntry] {
        &self.autostarts
    }

    /// How the session ended, `None` while it is still going.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// Power action requested for after the session ends.
    pub fn end_action(&self) -> EndAction {
        self.end_action
    }

    /// Begin the session: run phases until one has to wait for clients.
    pub async fn start(&mut self) {
        info!(
            "Starting session '{}' with {} autostart entries",
            self.config.session.name,
            self.autostarts.len()
        );
        self.try_advance().await;
    }

    /// Apply one event.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Request(request) => self.handle_request(request).await,
            SessionEvent::ProcessExited {
                startup_id,
                pid,
                status,
            } => self.on_process_exited(&startup_id, pid, status).await,
            SessionEvent::NameVanished { startup_id, watch } => {
                self.on_name_vanished(&startup_id, watch).await
            }
            SessionEvent::PeerResolved {
                startup_id,
                dbus_name,
                pid,
                args,
            } => self.on_peer_resolved(&startup_id, &dbus_name, pid, args),
            SessionEvent::LaunchDue { startup_id, token } => {
                self.on_launch_due(&startup_id, token).await
            }
            SessionEvent::PhaseTimeout { epoch } => self.on_phase_timeout(epoch).await,
            SessionEvent::Terminate => {
                info!("Received termination request, ending session");
                self.force_exit(SessionOutcome::Clean).await;
            }
        }
    }

    async fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::RegisterClient {
                sender,
                app_id,
                startup_id,
                reply,
            } => {
                let path = self.register_client(&sender, &app_id, &startup_id).await;
                let _ = reply.send(path);
            }
            SessionRequest::UnregisterClient { object_path, reply } => {
                self.unregister_client(&object_path).await;
                let _ = reply.send(());
            }
            SessionRequest::Inhibit {
                sender,
                app_id,
                toplevel_xid,
                reason,
                flags,
                reply,
            } => {
                let cookie = self
                    .inhibit(&sender, &app_id, toplevel_xid, &reason, flags)
                    .await;
                let _ = reply.send(cookie);
            }
            SessionRequest::Uninhibit { cookie, reply } => {
                self.uninhibit(cookie).await;
                let _ = reply.send(());
            }
            SessionRequest::IsInhibited { flags, reply } => {
                let _ = reply.send(self.inhibitors.is_inhibited(flags));
            }
            SessionRequest::Logout { mode, reply } => {
                let _ = reply.send(self.logout(mode).await);
            }
            SessionRequest::Shutdown { action, reply } => {
                let _ = reply.send(self.request_end(action, false).await);
            }
            SessionRequest::CanShutdown { reply } => {
                let _ = reply.send(!self.inhibitors.is_inhibited(InhibitFlag::Logout as u32));
            }
            SessionRequest::IsSessionRunning { reply } => {
                let _ = reply.send(self.phase() == SessionPhase::Running);
            }
            SessionRequest::GetClients { reply } => {
                let paths = self
                    .clients
                    .iter()
                    .filter_map(|c| c.object_path().map(str::to_string))
                    .collect();
                let _ = reply.send(paths);
            }
            SessionRequest::GetInhibitors { reply } => {
                let paths = self
                    .inhibitors
                    .iter()
                    .map(|i| inhibitor_object_path(i.cookie()))
                    .collect();
                let _ = reply.send(paths);
            }
            SessionRequest::GetCurrentClient { sender, reply } => {
                let path = self
                    .clients
                    .find(ClientQuery::dbus_name(&sender))
                    .and_then(|c| c.object_path().map(str::to_string));
                let _ = reply.send(path);
            }
            SessionRequest::Setenv {
                variable,
                value,
                reply,
            } => {
                let _ = reply.send(self.setenv(&variable, &value));
            }
            SessionRequest::InitializationError {
                message,
                fatal,
                reply,
            } => {
                self.initialization_error(&message, fatal).await;
                let _ = reply.send(());
            }
            SessionRequest::Properties { reply } => {
                let _ = reply.send(self.properties());
            }
            SessionRequest::ClientInfo { startup_id, reply } => {
                let _ = reply.send(self.client_info(&startup_id));
            }
            SessionRequest::StopClient { startup_id, reply } => {
                let _ = reply.send(self.stop_client(&startup_id).await);
            }
            SessionRequest::EndSessionResponse {
                startup_id,
                is_ok,
                reason,
                reply,
            } => {
                self.end_session_response(&startup_id, is_ok, &reason).await;
                let _ = reply.send(());
            }
            SessionRequest::InhibitorInfo { cookie, reply } => {
                let _ = reply.send(self.inhibitor_info(cookie));
            }
        }
    }

    /// Enter `phase` and perform its entry actions.
    pub(crate) async fn run_phase(&mut self, phase: SessionPhase) {
        let previous = self.sequencer.current();
        let Some(epoch) = self.sequencer.enter(phase) else {
            return;
        };
        info!("Entering phase {}", phase);

        match phase {
            SessionPhase::Startup => {}
            SessionPhase::Initialization
            | SessionPhase::WindowManager
            | SessionPhase::Panel
            | SessionPhase::Desktop
            | SessionPhase::Applications => self.launch_autostart_phase(phase).await,
            SessionPhase::Running => {
                if previous.is_startup() {
                    self.backend.emit(OutboundSignal::SessionRunning).await;
                }
            }
            SessionPhase::QueryEndSession | SessionPhase::EndSession => {
                self.broadcast_end_session(phase).await;
            }
            SessionPhase::Exit => {
                self.outcome.get_or_insert(SessionOutcome::Clean);
                self.backend.emit(OutboundSignal::SessionOver).await;
            }
        }

        if let Some(delay) = self.sequencer.timeout_for(phase) {
            self.backend.schedule_phase_timeout(phase, epoch, delay);
        }
    }

    /// Advance through every phase whose gating condition already holds.
    pub async fn try_advance(&mut self) {
        while self.outcome.is_none() {
            let phase = self.sequencer.current();
            let ready = match phase {
                SessionPhase::Startup => true,
                SessionPhase::QueryEndSession | SessionPhase::EndSession => {
                    self.sequencer.outstanding_responses() == 0
                }
                p if p.is_startup() => self.clients.phase_satisfied(p),
                _ => false,
            };
            if !ready {
                break;
            }
            let Some(next) = phase.next() else {
                break;
            };
            self.run_phase(next).await;
            if self.sequencer.current() == phase {
                break;
            }
        }
    }

    async fn on_phase_timeout(&mut self, epoch: u64) {
        if epoch != self.sequencer.epoch() || self.outcome.is_some() {
            debug!("Ignoring stale phase timer (epoch {})", epoch);
            return;
        }
        let phase = self.sequencer.current();
        let Some(next) = phase.next() else {
            return;
        };
        if self.sequencer.timeout_for(phase) == Some(Duration::ZERO) {
            debug!("Phase {} done, moving on to {}", phase, next);
        } else {
            warn!("Phase {} timed out, moving on to {}", phase, next);
        }
        self.run_phase(next).await;
        self.try_advance().await;
    }

    async fn launch_autostart_phase(&mut self, phase: SessionPhase) {
        let Some(name) = phase.autostart_name() else {
            return;
        };
        let catch_all = phase == SessionPhase::Applications;
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.autostarts)
            .into_iter()
            .partition(|entry| catch_all || entry.phase == name);
        self.autostarts = rest;

        for entry in due {
            let silent = !(entry.show_output || self.config.session.show_all_output);
            info!("Launching {} ({})", entry.display_name(), entry.exec);
            let startup_id = self
                .launch_process_inner(None, &entry.exec, entry.auto_restart, 0, entry.delay, silent)
                .await;
            if let Some(client) = self.clients.get_mut(&startup_id) {
                client.name = entry.name.clone();
            }
        }
    }

    /// Ask a client for an inhibition and export its object. Returns 0 on failure.
    pub async fn inhibit(
        &mut self,
        sender: &str,
        app_id: &str,
        toplevel_xid: u32,
        reason: &str,
        flags: u32,
    ) -> u32 {
        let (owner, _) = self.register_client_inner(sender, app_id, "").await;

        let cookie = self.inhibitors.allocate_cookie();
        let path = inhibitor_object_path(cookie);
        if let Err(e) = self.backend.export_inhibitor(cookie, &path).await {
            warn!("Failed to export inhibitor for {}: {}", app_id, e);
            self.try_advance().await;
            return 0;
        }

        self.inhibitors.insert(Inhibitor {
            cookie,
            client_id: owner,
            app_id: app_id.to_string(),
            reason: reason.to_string(),
            flags,
            toplevel_xid,
        });
        info!("{} inhibited actions {:#x}: {}", app_id, flags, reason);
        self.backend.emit(OutboundSignal::InhibitorAdded(path)).await;
        self.try_advance().await;
        cookie
    }

    /// Release an inhibition. Unknown cookies are ignored.
    pub async fn uninhibit(&mut self, cookie: u32) {
        if !self.remove_inhibitor(cookie).await {
            debug!("Uninhibit for unknown cookie {}", cookie);
        }
    }

    pub(crate) async fn remove_inhibitor(&mut self, cookie: u32) -> bool {
        let Some(inhibitor) = self.inhibitors.remove(cookie) else {
            return false;
        };
        let path = inhibitor_object_path(cookie);
        self.backend.unexport_inhibitor(&path).await;
        self.backend.emit(OutboundSignal::InhibitorRemoved(path)).await;
        debug!("Released inhibitor {} held by {}", cookie, inhibitor.app_id());
        true
    }

    fn properties(&self) -> SessionProperties {
        SessionProperties {
            session_name: self.config.session.name.clone(),
            session_is_active: self.phase() == SessionPhase::Running,
            inhibited_actions: self.inhibitors.inhibited_actions().bits(),
        }
    }

    /// Data served by a client's D-Bus object.
    pub fn client_info(&self, startup_id: &str) -> Option<ClientInfo> {
        let client = self.clients.get(startup_id)?;
        Some(ClientInfo {
            app_id: client.app_id().unwrap_or_default().to_string(),
            startup_id: client.startup_id().to_string(),
            restart_style_hint: if client.auto_restart() {
                RESTART_STYLE_IF_CRASHED
            } else {
                0
            },
            process_id: client.process_id().unwrap_or(0),
            status: client.status() as u32,
        })
    }

    /// Data served by an inhibitor's D-Bus object.
    pub fn inhibitor_info(&self, cookie: u32) -> Option<InhibitorInfo> {
        let inhibitor = self.inhibitors.get(cookie)?;
        let client_path = inhibitor
            .client_id()
            .and_then(|id| self.clients.get(id))
            .and_then(|c| c.object_path())
            .unwrap_or("/")
            .to_string();
        Some(InhibitorInfo {
            app_id: inhibitor.app_id().to_string(),
            client_path,
            reason: inhibitor.reason().to_string(),
            flags: inhibitor.flags(),
            toplevel_xid: inhibitor.toplevel_xid(),
        })
    }
}
