//! Shared fixtures: a recording backend and manager builders.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use graphene_session::autostart::AutostartEntry;
use graphene_session::config::Config;
use graphene_session::session::{
    ClientSignal, ExitStatus, OutboundSignal, PeerLookup, SessionBackend, SessionEvent,
    SessionManager, SessionPhase, SessionRequest, SpawnRequest, WatchId,
};
use graphene_session::{Result, SessionError};

/// First pid handed out by [`FakeBackend::spawn`].
pub const FIRST_PID: u32 = 1000;

/// Backend that records every side effect instead of performing it.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub spawned: Vec<(SpawnRequest, u32)>,
    pub fail_spawn: bool,
    pub fail_exports: bool,
    pub exported_clients: BTreeSet<String>,
    pub exported_inhibitors: BTreeSet<String>,
    pub signals: Vec<OutboundSignal>,
    pub launch_timers: Vec<(String, u64, Duration)>,
    pub phase_timers: Vec<(SessionPhase, u64, Duration)>,
    pub watches: HashMap<WatchId, (String, String)>,
    pub lookups: Vec<PeerLookup>,
    pub terminated: Arc<Mutex<Vec<u32>>>,
    next_watch: u64,
}

impl FakeBackend {
    pub fn spawn_count(&self) -> usize {
        self.spawned.len()
    }

    pub fn last_pid(&self) -> u32 {
        self.spawned.last().map(|(_, pid)| *pid).expect("nothing spawned")
    }

    /// Startup id of the n-th spawned process.
    pub fn spawned_id(&self, n: usize) -> String {
        self.spawned[n].0.startup_id.clone()
    }

    pub fn spawned_commands(&self) -> Vec<&str> {
        self.spawned.iter().map(|(r, _)| r.command.as_str()).collect()
    }

    /// Directed client signals sent so far.
    pub fn client_signals(&self) -> Vec<(String, ClientSignal)> {
        self.signals
            .iter()
            .filter_map(|s| match s {
                OutboundSignal::Client { path, signal, .. } => Some((path.clone(), *signal)),
                _ => None,
            })
            .collect()
    }

    pub fn count_signal(&self, wanted: &OutboundSignal) -> usize {
        self.signals.iter().filter(|s| *s == wanted).count()
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    fn spawn(&mut self, request: &SpawnRequest) -> Result<u32> {
        if self.fail_spawn {
            return Err(SessionError::InvalidCommand(request.command.clone()));
        }
        let pid = FIRST_PID + self.spawned.len() as u32;
        self.spawned.push((request.clone(), pid));
        Ok(pid)
    }

    fn schedule_launch(&mut self, startup_id: &str, token: u64, delay: Duration) {
        self.launch_timers.push((startup_id.to_string(), token, delay));
    }

    fn schedule_phase_timeout(&mut self, phase: SessionPhase, epoch: u64, delay: Duration) {
        self.phase_timers.push((phase, epoch, delay));
    }

    async fn export_client(&mut self, _startup_id: &str, path: &str) -> Result<()> {
        if self.fail_exports {
            return Err(SessionError::Export {
                path: path.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        self.exported_clients.insert(path.to_string());
        Ok(())
    }

    async fn unexport_client(&mut self, path: &str) {
        self.exported_clients.remove(path);
    }

    async fn export_inhibitor(&mut self, _cookie: u32, path: &str) -> Result<()> {
        if self.fail_exports {
            return Err(SessionError::Export {
                path: path.to_string(),
                reason: "refused by test".to_string(),
            });
        }
        self.exported_inhibitors.insert(path.to_string());
        Ok(())
    }

    async fn unexport_inhibitor(&mut self, path: &str) {
        self.exported_inhibitors.remove(path);
    }

    fn watch_name(&mut self, startup_id: &str, dbus_name: &str) -> WatchId {
        self.next_watch += 1;
        let watch = WatchId(self.next_watch);
        self.watches
            .insert(watch, (startup_id.to_string(), dbus_name.to_string()));
        watch
    }

    fn unwatch_name(&mut self, watch: WatchId) {
        self.watches.remove(&watch);
    }

    fn resolve_peer(&mut self, lookup: PeerLookup) {
        self.lookups.push(lookup);
    }

    async fn emit(&mut self, signal: OutboundSignal) {
        self.signals.push(signal);
    }

    fn terminate(&mut self, pid: u32) {
        self.terminated.lock().unwrap().push(pid);
    }
}

pub type TestManager = SessionManager<FakeBackend>;

pub fn config() -> Config {
    let mut config = Config::default();
    config.session.panel_command = "/usr/bin/graphene-panel".to_string();
    config
}

pub fn manager(config: Config, entries: Vec<AutostartEntry>) -> TestManager {
    SessionManager::new(Arc::new(config), FakeBackend::default(), entries)
}

/// A started manager with no autostart entries, already in Running.
pub async fn running_manager(config: Config) -> TestManager {
    let mut m = manager(config, Vec::new());
    m.start().await;
    assert_eq!(m.phase(), SessionPhase::Running);
    m
}

pub fn entry(file_name: &str, exec: &str, phase: &str, auto_restart: bool) -> AutostartEntry {
    AutostartEntry {
        file_name: format!("{}.desktop", file_name),
        name: Some(file_name.to_string()),
        exec: exec.to_string(),
        phase: phase.to_string(),
        auto_restart,
        delay: Duration::ZERO,
        show_output: false,
    }
}

/// Route a request through the event dispatcher and return its reply.
pub async fn request<T>(
    m: &mut TestManager,
    build: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
) -> T {
    let (tx, rx) = oneshot::channel();
    m.handle_event(SessionEvent::Request(build(tx))).await;
    rx.await.expect("request was not answered")
}

/// Report that the process with `pid` belonging to `startup_id` exited.
pub async fn exit(m: &mut TestManager, startup_id: &str, pid: u32, status: ExitStatus) {
    m.handle_event(SessionEvent::ProcessExited {
        startup_id: startup_id.to_string(),
        pid,
        status,
    })
    .await;
}

/// Fire the safety-net timer of the current phase.
pub async fn expire_phase(m: &mut TestManager) {
    let epoch = m.sequencer().epoch();
    m.handle_event(SessionEvent::PhaseTimeout { epoch }).await;
}

pub fn pid_of(m: &TestManager, startup_id: &str) -> u32 {
    m.clients()
        .get(startup_id)
        .and_then(|c| c.process_id())
        .expect("client has no pid")
}
