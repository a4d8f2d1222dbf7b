//! Session phases and the sequencer state that drives them.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::config::PhaseConfig;

/// Totally ordered session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    /// Before anything has been launched
    Startup,
    /// Settings daemons and other early services
    Initialization,
    /// The compositor / window manager
    WindowManager,
    /// The panel
    Panel,
    /// Desktop background and icons
    Desktop,
    /// Everything else from autostart
    Applications,
    /// Steady state
    Running,
    /// Clients are asked whether they can quit
    QueryEndSession,
    /// Clients are told to quit
    EndSession,
    /// Terminal phase
    Exit,
}

impl SessionPhase {
    /// All phases in order.
    pub const ALL: [SessionPhase; 10] = [
        SessionPhase::Startup,
        SessionPhase::Initialization,
        SessionPhase::WindowManager,
        SessionPhase::Panel,
        SessionPhase::Desktop,
        SessionPhase::Applications,
        SessionPhase::Running,
        SessionPhase::QueryEndSession,
        SessionPhase::EndSession,
        SessionPhase::Exit,
    ];

    /// The phase that follows this one, `None` at Exit.
    pub fn next(self) -> Option<SessionPhase> {
        let idx = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Name used by `X-GNOME-Autostart-Phase` for phases that launch autostart entries.
    pub fn autostart_name(self) -> Option<&'static str> {
        match self {
            SessionPhase::Initialization => Some("Initialization"),
            SessionPhase::WindowManager => Some("WindowManager"),
            SessionPhase::Panel => Some("Panel"),
            SessionPhase::Desktop => Some("Desktop"),
            SessionPhase::Applications => Some("Applications"),
            _ => None,
        }
    }

    /// True for the phases before Running.
    pub fn is_startup(self) -> bool {
        self < SessionPhase::Running
    }

    /// True once logout has begun.
    pub fn is_ending(self) -> bool {
        self >= SessionPhase::QueryEndSession
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Startup => "Startup",
            SessionPhase::Initialization => "Initialization",
            SessionPhase::WindowManager => "WindowManager",
            SessionPhase::Panel => "Panel",
            SessionPhase::Desktop => "Desktop",
            SessionPhase::Applications => "Applications",
            SessionPhase::Running => "Running",
            SessionPhase::QueryEndSession => "QueryEndSession",
            SessionPhase::EndSession => "EndSession",
            SessionPhase::Exit => "Exit",
        };
        f.write_str(name)
    }
}

/// Current phase, transition epoch and outstanding end-session responses.
///
/// Every successful [`enter`](Self::enter) bumps the epoch. Phase timers carry
/// the epoch they were armed in, so a timer that fires after the phase already
/// moved on is recognised as stale and cannot cause a second transition.
#[derive(Debug)]
pub struct PhaseSequencer {
    phase: SessionPhase,
    epoch: u64,
    awaiting: HashSet<String>,
    end_session_flags: u32,
    timeouts: PhaseConfig,
}

impl PhaseSequencer {
    /// Create a sequencer sitting in `Startup`.
    pub fn new(timeouts: PhaseConfig) -> Self {
        Self {
            phase: SessionPhase::Startup,
            epoch: 0,
            awaiting: HashSet::new(),
            end_session_flags: 0,
            timeouts,
        }
    }

    /// Current phase.
    pub fn current(&self) -> SessionPhase {
        self.phase
    }

    /// Epoch of the current phase.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Move to `phase`, returning the new epoch.
    ///
    /// Phases only move forward. The one permitted step back is
    /// QueryEndSession to Running when a logout is cancelled. Exit always
    /// wins so a fatal error can end the session from anywhere.
    pub fn enter(&mut self, phase: SessionPhase) -> Option<u64> {
        let allowed = phase > self.phase
            || (self.phase == SessionPhase::QueryEndSession && phase == SessionPhase::Running);
        if !allowed {
            warn!("Refusing phase transition {} -> {}", self.phase, phase);
            return None;
        }
        self.phase = phase;
        self.epoch += 1;
        self.awaiting.clear();
        Some(self.epoch)
    }

    /// Safety-net timeout for a phase, `None` for phases that never time out.
    pub fn timeout_for(&self, phase: SessionPhase) -> Option<Duration> {
        match phase {
            SessionPhase::Startup | SessionPhase::Running | SessionPhase::Exit => None,
            SessionPhase::QueryEndSession => {
                Some(Duration::from_secs(self.timeouts.query_end_session_timeout_secs))
            }
            SessionPhase::Applications => {
                Some(Duration::from_secs(self.timeouts.applications_timeout_secs))
            }
            _ => Some(Duration::from_secs(self.timeouts.default_timeout_secs)),
        }
    }

    /// Flags sent with QueryEndSession/EndSession/CancelEndSession.
    pub fn end_session_flags(&self) -> u32 {
        self.end_session_flags
    }

    pub(crate) fn set_end_session_flags(&mut self, flags: u32) {
        self.end_session_flags = flags;
    }

    /// Record the clients whose response is required before advancing.
    pub(crate) fn await_responses(&mut self, ids: impl IntoIterator<Item = String>) {
        self.awaiting = ids.into_iter().collect();
    }

    /// Mark one response as received. Returns false if it was not expected.
    pub(crate) fn record_response(&mut self, startup_id: &str) -> bool {
        self.awaiting.remove(startup_id)
    }

    /// Number of responses still outstanding.
    pub fn outstanding_responses(&self) -> usize {
        self.awaiting.len()
    }

    pub(crate) fn is_awaiting(&self, startup_id: &str) -> bool {
        self.awaiting.contains(startup_id)
    }
}
