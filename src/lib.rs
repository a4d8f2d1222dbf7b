//! # graphene-session
//!
//! Session manager for the Graphene desktop. It speaks the
//! `org.gnome.SessionManager` D-Bus protocol, starts autostart clients in
//! ordered phases, restarts crashed ones, and coordinates logout.
//!
//! # Architecture
//!
//! ```text
//! graphene-session
//!   ├─> autostart   (.desktop scanning)
//!   ├─> session     (client registry, phases, inhibitors, logout; no I/O)
//!   ├─> dbus        (D-Bus objects + ZbusBackend)
//!   ├─> process     (spawn, reap, signal)
//!   └─> logind      (power off / reboot after the session ends)
//! ```
//!
//! All session state lives in one [`session::SessionManager`] owned by a
//! single task. D-Bus calls, child exits and timers reach it as
//! [`session::SessionEvent`]s.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Autostart entry discovery
pub mod autostart;

/// Configuration loading
pub mod config;

/// Process wiring for a full session
pub mod daemon;

/// D-Bus surface
pub mod dbus;

/// Error types
pub mod error;

/// systemd-logind client
pub mod logind;

/// Child processes
pub mod process;

/// Session core
pub mod session;

/// Utility functions
pub mod utils;

pub use error::{Result, SessionError};
