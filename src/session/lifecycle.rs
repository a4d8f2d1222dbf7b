//! Client lifecycle: registration, spawning and the crash/restart policy.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backend::{OutboundSignal, PeerLookup, SessionBackend, SpawnRequest};
use super::client::{client_object_path, ExitStatus, Registration, WatchId};
use super::event::SessionOutcome;
use super::manager::SessionManager;
use super::phase::SessionPhase;
use super::registry::ClientQuery;

impl<B: SessionBackend> SessionManager<B> {
    /// Register a peer as a client and export its object.
    ///
    /// Returns the client's object path, or an empty string if the object
    /// could not be exported. Registering an already registered client
    /// returns the cached path without refreshing anything.
    pub async fn register_client(&mut self, sender: &str, app_id: &str, startup_id: &str) -> String {
        let (_, path) = self.register_client_inner(sender, app_id, startup_id).await;
        self.try_advance().await;
        path
    }

    pub(crate) async fn register_client_inner(
        &mut self,
        sender: &str,
        app_id: &str,
        startup_id: &str,
    ) -> (Option<String>, String) {
        let query = ClientQuery {
            startup_id: Some(startup_id),
            object_path: None,
            app_id: Some(app_id),
            dbus_name: Some(sender),
        };
        let phase = self.sequencer.current();
        let (id, created) = self.clients.add(query, phase);

        let Some(client) = self.clients.get(&id) else {
            return (None, String::new());
        };
        if let Some(path) = client.object_path() {
            return (Some(id), path.to_string());
        }
        let known_pid = client.process_id;
        let want_args = client.launch_args.is_none();

        let path = client_object_path(&id);
        if let Err(e) = self.backend.export_client(&id, &path).await {
            warn!("Failed to register client {} ({}): {}", app_id, sender, e);
            if created {
                self.clients.remove(&id);
                return (None, String::new());
            }
            return (Some(id), String::new());
        }

        let bus_watch = self.backend.watch_name(&id, sender);
        let Some(client) = self.clients.get_mut(&id) else {
            return (None, String::new());
        };
        client.registration = Some(Registration {
            object_path: path.clone(),
            app_id: Some(app_id).filter(|a| !a.is_empty()).map(str::to_string),
            dbus_name: sender.to_string(),
            bus_watch,
        });
        info!("Registered client {} at {}", client.best_name(), path);

        if known_pid.is_none() || want_args {
            self.backend.resolve_peer(PeerLookup {
                startup_id: id.clone(),
                dbus_name: sender.to_string(),
                known_pid,
                want_args,
            });
        }
        self.backend
            .emit(OutboundSignal::ClientAdded(path.clone()))
            .await;
        (Some(id), path)
    }

    /// Drop a client's registration, keeping it tracked.
    pub async fn unregister_client(&mut self, object_path: &str) {
        match self.clients.find_id(ClientQuery::object_path(object_path)) {
            Some(id) => {
                self.clear_registration(&id).await;
                info!("Unregistered client at {}", object_path);
            }
            None => debug!("UnregisterClient for unknown path {}", object_path),
        }
        self.try_advance().await;
    }

    /// Stop watching, unexport and forget the bus identity of a client.
    pub(crate) async fn clear_registration(&mut self, startup_id: &str) {
        let Some(client) = self.clients.get_mut(startup_id) else {
            return;
        };
        let Some(registration) = client.registration.take() else {
            return;
        };
        // A pid learned from the bus is only trustworthy while the peer is
        // watched; our own children stay covered by the child watch.
        if client.child_watch.is_none() {
            client.process_id = None;
        }
        // An unregistered client can no longer answer end-session queries.
        self.sequencer.record_response(startup_id);
        self.backend.unwatch_name(registration.bus_watch);
        self.backend
            .unexport_client(&registration.object_path)
            .await;
        self.backend
            .emit(OutboundSignal::ClientRemoved(registration.object_path))
            .await;
    }

    /// Start (or schedule) the process for a client, creating the client if needed.
    ///
    /// Returns the client's startup id.
    pub async fn launch_process(
        &mut self,
        startup_id: Option<&str>,
        args: &str,
        auto_restart: bool,
        restart_count: u32,
        delay: Duration,
        silent: bool,
    ) -> String {
        let id = self
            .launch_process_inner(startup_id, args, auto_restart, restart_count, delay, silent)
            .await;
        self.try_advance().await;
        id
    }

    pub(crate) async fn launch_process_inner(
        &mut self,
        startup_id: Option<&str>,
        args: &str,
        auto_restart: bool,
        restart_count: u32,
        delay: Duration,
        silent: bool,
    ) -> String {
        let query = ClientQuery {
            startup_id,
            ..ClientQuery::default()
        };
        let phase = self.sequencer.current();
        let (id, _) = self.clients.add(query, phase);

        let token = if delay.is_zero() {
            None
        } else {
            self.next_launch_token += 1;
            Some(self.next_launch_token)
        };

        let Some(client) = self.clients.get_mut(&id) else {
            return id;
        };
        client.launch_args = Some(args.to_string());
        client.auto_restart = auto_restart;
        client.restart_count = restart_count;
        client.silent = silent;
        client.failed = false;
        client.pending_launch = token;

        match token {
            Some(token) => {
                debug!("Launching {} in {:?}", args, delay);
                self.backend.schedule_launch(&id, token, delay);
            }
            None => self.spawn_client(&id).await,
        }
        id
    }

    async fn spawn_client(&mut self, startup_id: &str) {
        let Some(client) = self.clients.get(startup_id) else {
            return;
        };
        let Some(command) = client.launch_args.clone() else {
            return;
        };
        let request = SpawnRequest {
            startup_id: startup_id.to_string(),
            command: command.clone(),
            silent: client.silent,
            env: self.environment.clone(),
        };

        match self.backend.spawn(&request) {
            Ok(pid) => {
                if let Some(client) = self.clients.get_mut(startup_id) {
                    client.process_id = Some(pid);
                    client.child_watch = Some(pid);
                }
                debug!("Started '{}' as pid {}", command, pid);
            }
            Err(e) => {
                error!("Failed to start '{}': {}", command, e);
                let registered = self
                    .clients
                    .get(startup_id)
                    .is_some_and(|c| c.is_registered());
                if !registered {
                    self.remove_client_inner(startup_id).await;
                }
            }
        }
    }

    pub(crate) async fn on_launch_due(&mut self, startup_id: &str, token: u64) {
        let due = self
            .clients
            .get_mut(startup_id)
            .filter(|c| c.pending_launch == Some(token))
            .map(|c| c.pending_launch.take())
            .is_some();
        if !due {
            debug!("Ignoring stale launch timer for {}", startup_id);
            return;
        }
        self.spawn_client(startup_id).await;
        self.try_advance().await;
    }

    pub(crate) async fn on_process_exited(&mut self, startup_id: &str, pid: u32, status: ExitStatus) {
        let watched = match self.clients.get_mut(startup_id) {
            Some(client) if client.child_watch == Some(pid) => {
                client.child_watch = None;
                client.process_id = None;
                true
            }
            _ => false,
        };
        if !watched {
            debug!("Ignoring exit of unwatched pid {} ({})", pid, status);
            return;
        }
        self.on_client_exit(startup_id, status).await;
    }

    pub(crate) async fn on_name_vanished(&mut self, startup_id: &str, watch: WatchId) {
        let Some(client) = self.clients.get(startup_id) else {
            return;
        };
        if client.bus_watch() != Some(watch) {
            debug!("Ignoring stale bus watch for {}", startup_id);
            return;
        }
        if client.child_watch.is_some() {
            // The exit status will follow from the child watch.
            info!("{} left the bus", client.best_name());
            self.clear_registration(startup_id).await;
            self.try_advance().await;
            return;
        }
        info!("{} left the bus without unregistering", client.best_name());
        self.on_client_exit(startup_id, ExitStatus::Code(1)).await;
    }

    pub(crate) fn on_peer_resolved(
        &mut self,
        startup_id: &str,
        dbus_name: &str,
        pid: Option<u32>,
        args: Option<String>,
    ) {
        let Some(client) = self
            .clients
            .get_mut(startup_id)
            .filter(|c| c.dbus_name() == Some(dbus_name))
        else {
            debug!("Discarding peer info for departed client {}", startup_id);
            return;
        };
        if client.process_id.is_none() {
            client.process_id = pid;
        }
        if client.launch_args.is_none() {
            client.launch_args = args.filter(|a| !a.is_empty());
        }
        debug!(
            "Resolved {}: pid {:?}, command {:?}",
            startup_id, client.process_id, client.launch_args
        );
    }

    /// Apply the restart policy to a client whose process or bus connection ended.
    pub async fn on_client_exit(&mut self, startup_id: &str, status: ExitStatus) {
        self.client_exited(startup_id, status).await;
        self.try_advance().await;
    }

    async fn client_exited(&mut self, startup_id: &str, status: ExitStatus) {
        let phase = self.sequencer.current();
        let steady = phase == SessionPhase::Running
            || (self.config.restart.during_startup && phase.is_startup());

        let Some(client) = self.clients.get(startup_id) else {
            return;
        };
        let name = client.best_name().to_string();
        let restartable =
            client.auto_restart && client.launch_args.is_some() && !status.success() && steady;
        if !restartable {
            info!("{} exited ({}), removing", name, status);
            self.remove_client_inner(startup_id).await;
            return;
        }

        let args = client.launch_args.clone().unwrap_or_default();
        let restart_count = client.restart_count;
        let silent = client.silent;

        self.clear_registration(startup_id).await;
        if let Some(client) = self.clients.get_mut(startup_id) {
            client.child_watch = None;
            client.process_id = None;
            client.pending_launch = None;
        }

        let max_restarts = self.config.restart.max_restarts;
        let reload_code = self.config.restart.panel_reload_exit_code;
        let is_panel = args.starts_with(self.config.session.panel_command.as_str());
        if is_panel && status.code() == Some(reload_code) {
            info!("Panel asked to be reloaded");
            self.launch_process_inner(Some(startup_id), &args, true, 0, Duration::ZERO, silent)
                .await;
        } else if restart_count < max_restarts {
            warn!(
                "{} exited with {}, restarting ({}/{})",
                name,
                status,
                restart_count + 1,
                max_restarts
            );
            self.launch_process_inner(
                Some(startup_id),
                &args,
                true,
                restart_count + 1,
                Duration::ZERO,
                silent,
            )
            .await;
        } else if is_panel {
            error!("The panel has crashed too many times, ending the session");
            self.force_exit(SessionOutcome::Failed).await;
        } else {
            error!(
                "{} has crashed too many times and will not be restarted",
                name
            );
            if let Some(client) = self.clients.get_mut(startup_id) {
                client.failed = true;
            }
        }
    }

    /// Forget a client entirely, releasing its inhibitors first.
    pub async fn remove_client(&mut self, startup_id: &str) {
        self.remove_client_inner(startup_id).await;
        self.try_advance().await;
    }

    pub(crate) async fn remove_client_inner(&mut self, startup_id: &str) {
        if self.clients.get(startup_id).is_none() {
            return;
        }
        self.clear_registration(startup_id).await;
        for cookie in self.inhibitors.owned_by(startup_id) {
            self.remove_inhibitor(cookie).await;
        }
        self.sequencer.record_response(startup_id);
        if let Some(client) = self.clients.remove(startup_id) {
            debug!("Removed client {}", client.best_name());
        }
    }
}
