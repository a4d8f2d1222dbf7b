//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How loosely client identities are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Any supplied identity field may match
    #[default]
    Loose,
    /// A supplied startup id is authoritative
    Strict,
}

/// General session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name reported over D-Bus
    pub name: String,

    /// Command prefix identifying the panel process
    pub panel_command: String,

    /// Desktop names matched against `OnlyShowIn` / `NotShowIn`
    pub desktop_names: Vec<String>,

    /// Extra autostart directories, scanned after the system ones
    #[serde(default)]
    pub autostart_dirs: Vec<PathBuf>,

    /// Never silence client stdout/stderr
    #[serde(default)]
    pub show_all_output: bool,

    /// Client identity matching
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "graphene".to_string(),
            panel_command: "/usr/share/graphene/graphene-panel".to_string(),
            desktop_names: vec!["GNOME".to_string(), "Graphene".to_string()],
            autostart_dirs: vec![PathBuf::from("/usr/share/graphene/autostart")],
            show_all_output: false,
            match_policy: MatchPolicy::Loose,
        }
    }
}

/// Phase safety-net timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Timeout for startup phases and EndSession (seconds)
    pub default_timeout_secs: u64,

    /// Timeout for QueryEndSession (seconds)
    pub query_end_session_timeout_secs: u64,

    /// Timeout for Applications (seconds, 0 = as soon as the loop is idle)
    pub applications_timeout_secs: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 10,
            query_end_session_timeout_secs: 1,
            applications_timeout_secs: 0,
        }
    }
}

/// Crash restart policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Restarts allowed before a client is abandoned
    pub max_restarts: u32,

    /// Panel exit code meaning "reload me"
    pub panel_reload_exit_code: i32,

    /// Also restart crashed clients while the session is starting up
    #[serde(default)]
    pub during_startup: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            panel_reload_exit_code: 120,
            during_startup: false,
        }
    }
}

/// Logout behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for children after Exit before SIGTERM (milliseconds)
    pub exit_timeout_ms: u64,

    /// Cancel a logout when a client answers QueryEndSession with false
    #[serde(default)]
    pub honor_end_session_refusal: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            exit_timeout_ms: 2000,
            honor_end_session_refusal: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
