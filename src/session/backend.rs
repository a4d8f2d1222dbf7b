//! The seam between the session core and the outside world.
//!
//! [`SessionManager`](super::SessionManager) never touches D-Bus, timers or
//! processes directly. It asks a [`SessionBackend`] to do so, and the backend
//! reports completions back as [`SessionEvent`](super::SessionEvent)s.

use std::time::Duration;

use async_trait::async_trait;

use super::client::WatchId;
use super::phase::SessionPhase;
use crate::error::Result;

/// Everything needed to start one client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Client the process belongs to
    pub startup_id: String,
    /// Full command line
    pub command: String,
    /// Discard stdout/stderr
    pub silent: bool,
    /// Extra environment set with `Setenv`
    pub env: Vec<(String, String)>,
}

/// What the backend should look up about a freshly registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLookup {
    /// Client the result belongs to
    pub startup_id: String,
    /// Bus name of the peer
    pub dbus_name: String,
    /// Pid already known from spawning, if any
    pub known_pid: Option<u32>,
    /// Whether the command line should be reconstructed
    pub want_args: bool,
}

/// Signals sent to a single client's private interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSignal {
    /// Quit now
    Stop,
    /// Can you quit?
    QueryEndSession(u32),
    /// Quit, the session is ending
    EndSession(u32),
    /// Logout was cancelled
    CancelEndSession(u32),
}

/// Signals emitted by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundSignal {
    /// A client registered
    ClientAdded(String),
    /// A client unregistered
    ClientRemoved(String),
    /// An inhibitor was added
    InhibitorAdded(String),
    /// An inhibitor was removed
    InhibitorRemoved(String),
    /// The session reached the Running phase
    SessionRunning,
    /// The session reached the Exit phase
    SessionOver,
    /// Directed signal on a client's private interface
    Client {
        /// Bus name of the receiving peer
        destination: String,
        /// Client object path
        path: String,
        /// Signal and arguments
        signal: ClientSignal,
    },
}

/// Side effects requested by the session core.
#[async_trait]
pub trait SessionBackend: Send {
    /// Start a process and watch for its exit. Returns the pid.
    fn spawn(&mut self, request: &SpawnRequest) -> Result<u32>;

    /// Deliver `LaunchDue { startup_id, token }` after `delay`.
    fn schedule_launch(&mut self, startup_id: &str, token: u64, delay: Duration);

    /// Deliver `PhaseTimeout { epoch }` after `delay`.
    fn schedule_phase_timeout(&mut self, phase: SessionPhase, epoch: u64, delay: Duration);

    /// Export the Client and ClientPrivate objects.
    async fn export_client(&mut self, startup_id: &str, path: &str) -> Result<()>;

    /// Remove a client's objects from the bus.
    async fn unexport_client(&mut self, path: &str);

    /// Export an Inhibitor object.
    async fn export_inhibitor(&mut self, cookie: u32, path: &str) -> Result<()>;

    /// Remove an inhibitor object from the bus.
    async fn unexport_inhibitor(&mut self, path: &str);

    /// Deliver `NameVanished` once `dbus_name` loses its owner.
    fn watch_name(&mut self, startup_id: &str, dbus_name: &str) -> WatchId;

    /// Stop a watch started with [`watch_name`](Self::watch_name).
    fn unwatch_name(&mut self, watch: WatchId);

    /// Resolve pid and command line of a peer, delivering `PeerResolved`.
    fn resolve_peer(&mut self, lookup: PeerLookup);

    /// Emit a D-Bus signal. Failures are logged, not returned.
    async fn emit(&mut self, signal: OutboundSignal);

    /// Send SIGTERM to `pid`.
    fn terminate(&mut self, pid: u32);
}
