//! Startup diagnostics and user-facing error formatting

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{log_startup_diagnostics, SessionEnvironment, SystemInfo};
pub use errors::format_user_error;
