//! Session manager error types

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session manager error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// Underlying D-Bus failure
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    /// An object could not be placed on the bus
    #[error("Failed to export {path}: {reason}")]
    Export {
        /// Object path that was being exported
        path: String,
        /// Why the export failed
        reason: String,
    },

    /// Launch arguments could not be turned into an argv
    #[error("Invalid command line: {0:?}")]
    InvalidCommand(String),

    /// The OS refused to start a process
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        /// Command line that failed
        command: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// Caller supplied an unacceptable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request was refused in the current session state
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// The manager task has shut down
    #[error("Session manager is no longer running")]
    ManagerGone,
}

impl From<SessionError> for zbus::fdo::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidArgument(msg) => zbus::fdo::Error::InvalidArgs(msg),
            SessionError::NotAllowed(msg) => zbus::fdo::Error::AccessDenied(msg),
            other => zbus::fdo::Error::Failed(other.to_string()),
        }
    }
}
