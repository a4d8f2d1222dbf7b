//! Typed events delivered to the session task.
//!
//! D-Bus method calls arrive as [`SessionRequest`] variants, one per
//! (interface, method) pair, each carrying a `oneshot` reply channel.
//! Asynchronous completions from the backend arrive as the remaining
//! [`SessionEvent`] variants.

use tokio::sync::{mpsc, oneshot};

use super::client::{ExitStatus, WatchId};
use crate::error::{Result, SessionError};

/// What should happen once the session has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// Just end the session
    Logout,
    /// Power the machine off afterwards
    PowerOff,
    /// Reboot afterwards
    Reboot,
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Regular logout
    Clean,
    /// Critical failure such as a crash-looping panel
    Failed,
}

/// Client details served by the Client interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// App id, empty if unknown
    pub app_id: String,
    /// Startup id
    pub startup_id: String,
    /// Restart style hint
    pub restart_style_hint: u32,
    /// Pid, 0 if unknown
    pub process_id: u32,
    /// Status code
    pub status: u32,
}

/// Inhibitor details served by the Inhibitor interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InhibitorInfo {
    /// App id given by the caller
    pub app_id: String,
    /// Object path of the owning client, `/` if it is not registered
    pub client_path: String,
    /// Reason text
    pub reason: String,
    /// Raw flags
    pub flags: u32,
    /// Toplevel window id
    pub toplevel_xid: u32,
}

/// Values of the manager's D-Bus properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProperties {
    /// Configured session name
    pub session_name: String,
    /// Whether the session is past startup and not ending
    pub session_is_active: bool,
    /// Union of inhibited action bits
    pub inhibited_actions: u32,
}

/// A D-Bus method call routed to the session task.
#[derive(Debug)]
pub enum SessionRequest {
    /// `SessionManager.RegisterClient`
    RegisterClient {
        /// Unique bus name of the caller
        sender: String,
        /// App id argument
        app_id: String,
        /// Startup id argument
        startup_id: String,
        /// Object path, empty on failure
        reply: oneshot::Sender<String>,
    },
    /// `SessionManager.UnregisterClient`
    UnregisterClient {
        /// Path of the client object
        object_path: String,
        /// Completion
        reply: oneshot::Sender<()>,
    },
    /// `SessionManager.Inhibit`
    Inhibit {
        /// Unique bus name of the caller
        sender: String,
        /// App id argument
        app_id: String,
        /// Caller's toplevel window
        toplevel_xid: u32,
        /// Reason text
        reason: String,
        /// Inhibited action bits
        flags: u32,
        /// Cookie, 0 on failure
        reply: oneshot::Sender<u32>,
    },
    /// `SessionManager.Uninhibit`
    Uninhibit {
        /// Cookie to release
        cookie: u32,
        /// Completion
        reply: oneshot::Sender<()>,
    },
    /// `SessionManager.IsInhibited`
    IsInhibited {
        /// Action bits to test
        flags: u32,
        /// Answer
        reply: oneshot::Sender<bool>,
    },
    /// `SessionManager.Logout`
    Logout {
        /// 0 normal, 1 no confirmation, 2 force
        mode: u32,
        /// Refused when inhibited
        reply: oneshot::Sender<Result<()>>,
    },
    /// `SessionManager.Shutdown` and `SessionManager.Reboot`
    Shutdown {
        /// Power action to run after the session ends
        action: EndAction,
        /// Refused when inhibited
        reply: oneshot::Sender<Result<()>>,
    },
    /// `SessionManager.CanShutdown`, inhibitor half
    CanShutdown {
        /// False while logout is inhibited
        reply: oneshot::Sender<bool>,
    },
    /// `SessionManager.IsSessionRunning`
    IsSessionRunning {
        /// Answer
        reply: oneshot::Sender<bool>,
    },
    /// `SessionManager.GetClients`
    GetClients {
        /// Object paths of registered clients
        reply: oneshot::Sender<Vec<String>>,
    },
    /// `SessionManager.GetInhibitors`
    GetInhibitors {
        /// Object paths of inhibitors
        reply: oneshot::Sender<Vec<String>>,
    },
    /// `SessionManager.GetCurrentClient`
    GetCurrentClient {
        /// Unique bus name of the caller
        sender: String,
        /// Object path of the caller's client
        reply: oneshot::Sender<Option<String>>,
    },
    /// `SessionManager.Setenv`
    Setenv {
        /// Variable name
        variable: String,
        /// Value
        value: String,
        /// Rejected after startup or for malformed names
        reply: oneshot::Sender<Result<()>>,
    },
    /// `SessionManager.InitializationError`
    InitializationError {
        /// Message from the failing component
        message: String,
        /// End the session if still starting up
        fatal: bool,
        /// Completion
        reply: oneshot::Sender<()>,
    },
    /// Manager property reads
    Properties {
        /// Current values
        reply: oneshot::Sender<SessionProperties>,
    },
    /// Client interface getters
    ClientInfo {
        /// Client to describe
        startup_id: String,
        /// `None` if the client is gone
        reply: oneshot::Sender<Option<ClientInfo>>,
    },
    /// `Client.Stop`
    StopClient {
        /// Client to stop
        startup_id: String,
        /// Completion
        reply: oneshot::Sender<Result<()>>,
    },
    /// `ClientPrivate.EndSessionResponse`
    EndSessionResponse {
        /// Responding client
        startup_id: String,
        /// Whether the client agrees to end the session
        is_ok: bool,
        /// Reason for a refusal
        reason: String,
        /// Completion
        reply: oneshot::Sender<()>,
    },
    /// Inhibitor interface getters
    InhibitorInfo {
        /// Inhibitor to describe
        cookie: u32,
        /// `None` if the inhibitor is gone
        reply: oneshot::Sender<Option<InhibitorInfo>>,
    },
}

/// Everything the session task reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// A D-Bus method call
    Request(SessionRequest),
    /// A spawned process ended
    ProcessExited {
        /// Client the process belonged to
        startup_id: String,
        /// Pid that exited
        pid: u32,
        /// How it ended
        status: ExitStatus,
    },
    /// A registered peer's bus name lost its owner
    NameVanished {
        /// Client the watch belonged to
        startup_id: String,
        /// Watch that fired
        watch: WatchId,
    },
    /// Pid / command line lookup for a peer finished
    PeerResolved {
        /// Client the lookup belonged to
        startup_id: String,
        /// Bus name that was looked up
        dbus_name: String,
        /// Peer pid, if found
        pid: Option<u32>,
        /// Command line, if found
        args: Option<String>,
    },
    /// A delayed launch is due
    LaunchDue {
        /// Client to spawn
        startup_id: String,
        /// Token identifying the scheduled launch
        token: u64,
    },
    /// A phase safety-net timer expired
    PhaseTimeout {
        /// Epoch the timer was armed in
        epoch: u64,
    },
    /// The manager process was asked to quit
    Terminate,
}

/// Cloneable sender used by D-Bus objects and backend tasks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Wrap the sending half of the session event channel.
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    /// Post an event.
    pub fn send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| SessionError::ManagerGone)
    }

    /// Post a request and wait for its reply.
    pub async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Request(build(reply)))?;
        rx.await.map_err(|_| SessionError::ManagerGone)
    }
}
