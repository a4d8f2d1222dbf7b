//! Session core
//!
//! Client tracking, phased startup, inhibitors and logout, independent of
//! D-Bus. The [`SessionManager`] context object owns all state and talks to
//! the outside world only through a [`SessionBackend`].
//!
//! # Architecture
//!
//! ```text
//! D-Bus objects ─┐
//! child exits   ─┤
//! bus watches   ─┼─> SessionEvent channel ─> driver::run ─> SessionManager
//! timers        ─┤                                              │
//! SIGTERM       ─┘                                              ▼
//!                                                         SessionBackend
//! ```

pub mod backend;
pub mod client;
pub mod driver;
pub mod event;
pub mod inhibitor;
mod lifecycle;
pub mod manager;
pub mod phase;
pub mod registry;
mod shutdown;

pub use backend::{
    ClientSignal, OutboundSignal, PeerLookup, SessionBackend, SpawnRequest,
};
pub use client::{Client, ClientStatus, ExitStatus, WatchId};
pub use driver::SessionExit;
pub use event::{
    ClientInfo, EndAction, InhibitorInfo, SessionEvent, SessionHandle, SessionOutcome,
    SessionProperties, SessionRequest,
};
pub use inhibitor::{InhibitFlag, Inhibitor, InhibitorRegistry};
pub use manager::SessionManager;
pub use phase::{PhaseSequencer, SessionPhase};
pub use registry::{ClientQuery, ClientRegistry};
pub use shutdown::{END_SESSION_FLAG_FORCEFUL, LOGOUT_MODE_FORCE};
