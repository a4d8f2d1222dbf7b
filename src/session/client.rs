//! Tracked session clients
//!
//! A [`Client`] is one program taking part in the session, either spawned by
//! the manager from an autostart entry or registered by itself over D-Bus.

use std::fmt;

use super::phase::SessionPhase;

/// Prefix for exported client objects.
pub const CLIENT_PATH_PREFIX: &str = "/org/gnome/SessionManager/Client";

/// Prefix for exported inhibitor objects.
pub const INHIBITOR_PATH_PREFIX: &str = "/org/gnome/SessionManager/Inhibitor";

/// Handle of an active bus-name watch, issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a code
    Code(i32),
    /// Killed by a signal
    Signaled(i32),
}

impl ExitStatus {
    /// True for a zero exit code.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Exit code, `None` if the process was killed.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            ExitStatus::Signaled(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitStatus::Code(code),
            (None, Some(signal)) => ExitStatus::Signaled(signal),
            (None, None) => ExitStatus::Code(1),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(signal) => write!(f, "signal {}", signal),
        }
    }
}

/// Status reported by `org.gnome.SessionManager.Client.GetStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ClientStatus {
    /// Not (or no longer) registered
    Unregistered = 0,
    /// Registered and alive
    Registered = 1,
    /// Answered EndSession and is on its way out
    Finished = 2,
    /// Restart budget exhausted
    Failed = 3,
}

/// State that exists only while a client is registered on the bus.
///
/// Keeping these together means a client is either fully registered or not at
/// all.
#[derive(Debug, Clone)]
pub struct Registration {
    pub(crate) object_path: String,
    pub(crate) app_id: Option<String>,
    pub(crate) dbus_name: String,
    pub(crate) bus_watch: WatchId,
}

/// One program participating in the session.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) startup_id: String,
    pub(crate) registration: Option<Registration>,
    pub(crate) name: Option<String>,
    pub(crate) launch_args: Option<String>,
    pub(crate) process_id: Option<u32>,
    /// Pid whose exit we are waiting on.
    pub(crate) child_watch: Option<u32>,
    /// Token of the pending delayed-launch timer.
    pub(crate) pending_launch: Option<u64>,
    pub(crate) auto_restart: bool,
    pub(crate) restart_count: u32,
    pub(crate) silent: bool,
    pub(crate) failed: bool,
    /// Acknowledged EndSession.
    pub(crate) finished: bool,
    pub(crate) phase: SessionPhase,
}

impl Client {
    pub(crate) fn new(startup_id: String, phase: SessionPhase) -> Self {
        Self {
            startup_id,
            registration: None,
            name: None,
            launch_args: None,
            process_id: None,
            child_watch: None,
            pending_launch: None,
            auto_restart: false,
            restart_count: 0,
            silent: false,
            failed: false,
            finished: false,
            phase,
        }
    }

    /// Startup id, the registry key.
    pub fn startup_id(&self) -> &str {
        &self.startup_id
    }

    /// Whether the client is currently registered.
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Exported object path while registered.
    pub fn object_path(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.object_path.as_str())
    }

    /// Application id supplied at registration.
    pub fn app_id(&self) -> Option<&str> {
        self.registration.as_ref().and_then(|r| r.app_id.as_deref())
    }

    /// Bus name of the registered peer.
    pub fn dbus_name(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.dbus_name.as_str())
    }

    /// Active bus-name watch.
    pub fn bus_watch(&self) -> Option<WatchId> {
        self.registration.as_ref().map(|r| r.bus_watch)
    }

    /// Full command line, if known.
    pub fn launch_args(&self) -> Option<&str> {
        self.launch_args.as_deref()
    }

    /// OS process id, if known.
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Whether the client is restarted after a crash.
    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    /// Restarts performed so far.
    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Whether stdio of the process is discarded.
    pub fn silent(&self) -> bool {
        self.silent
    }

    /// Phase the client was created in.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a delayed launch is still pending.
    pub fn launch_pending(&self) -> bool {
        self.pending_launch.is_some()
    }

    /// Whether the restart budget was exhausted.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Pid that may still be signalled: a child we are waiting on, or the
    /// process behind a peer that is still on the bus.
    pub fn signalable_pid(&self) -> Option<u32> {
        self.child_watch
            .or_else(|| self.process_id.filter(|_| self.is_registered()))
    }

    /// Status code for `GetStatus`.
    pub fn status(&self) -> ClientStatus {
        if self.failed {
            ClientStatus::Failed
        } else if self.finished {
            ClientStatus::Finished
        } else if self.is_registered() {
            ClientStatus::Registered
        } else {
            ClientStatus::Unregistered
        }
    }

    /// Most descriptive name available, for log messages.
    pub fn best_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.app_id())
            .or_else(|| self.dbus_name())
            .or(self.launch_args.as_deref())
            .unwrap_or(&self.startup_id)
    }
}

/// Generate a fresh startup id: `0` followed by 16 random hex digits.
pub fn generate_startup_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("0{}", &hex[..16])
}

/// Object path for a client; bytes outside `[A-Za-z0-9_]` become `_`.
pub fn client_object_path(startup_id: &str) -> String {
    format!("{}{}", CLIENT_PATH_PREFIX, sanitize_path_element(startup_id))
}

/// Object path for an inhibitor cookie.
pub fn inhibitor_object_path(cookie: u32) -> String {
    format!("{}{}", INHIBITOR_PATH_PREFIX, cookie)
}

fn sanitize_path_element(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_startup_id_shape() {
        let id = generate_startup_id();
        assert_eq!(id.len(), 17);
        assert!(id.starts_with('0'));
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_startup_id());
    }

    #[test]
    fn test_object_paths() {
        assert_eq!(
            client_object_path("0abc"),
            "/org/gnome/SessionManager/Client0abc"
        );
        assert_eq!(
            client_object_path("10d8-c.x"),
            "/org/gnome/SessionManager/Client10d8_c_x"
        );
        assert_eq!(
            inhibitor_object_path(7),
            "/org/gnome/SessionManager/Inhibitor7"
        );
    }

    #[test]
    fn test_exit_status() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(120).success());
        assert!(!ExitStatus::Signaled(11).success());
        assert_eq!(ExitStatus::Signaled(9).code(), None);
        assert_eq!(ExitStatus::Code(120).code(), Some(120));
    }

    #[test]
    fn test_exit_status_from_std() {
        use std::os::unix::process::ExitStatusExt;

        let exited = std::process::ExitStatus::from_raw(120 << 8);
        assert_eq!(ExitStatus::from(exited), ExitStatus::Code(120));

        let killed = std::process::ExitStatus::from_raw(9);
        assert_eq!(ExitStatus::from(killed), ExitStatus::Signaled(9));
    }

    #[test]
    fn test_best_name_fallbacks() {
        let mut client = Client::new("0123".to_string(), SessionPhase::Running);
        assert_eq!(client.best_name(), "0123");

        client.launch_args = Some("/usr/bin/foo --bar".to_string());
        assert_eq!(client.best_name(), "/usr/bin/foo --bar");

        client.registration = Some(Registration {
            object_path: client_object_path("0123"),
            app_id: Some("foo.desktop".to_string()),
            dbus_name: ":1.42".to_string(),
            bus_watch: WatchId(1),
        });
        assert_eq!(client.best_name(), "foo.desktop");
        assert_eq!(client.status(), ClientStatus::Registered);

        client.name = Some("Foo".to_string());
        assert_eq!(client.best_name(), "Foo");
    }

    #[test]
    fn test_status_and_signalable_pid() {
        let mut client = Client::new("0123".to_string(), SessionPhase::Running);
        client.process_id = Some(77);
        assert_eq!(client.status(), ClientStatus::Unregistered);
        assert_eq!(client.signalable_pid(), None);

        client.registration = Some(Registration {
            object_path: client_object_path("0123"),
            app_id: None,
            dbus_name: ":1.42".to_string(),
            bus_watch: WatchId(1),
        });
        assert_eq!(client.signalable_pid(), Some(77));

        client.finished = true;
        assert_eq!(client.status(), ClientStatus::Finished);
        client.failed = true;
        assert_eq!(client.status(), ClientStatus::Failed);

        client.registration = None;
        client.child_watch = Some(78);
        assert_eq!(client.signalable_pid(), Some(78));
    }
}
