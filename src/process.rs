//! Child process plumbing: spawning, reaping, signalling and `/proc` lookups.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::session::{ExitStatus, SessionEvent, SessionHandle, SpawnRequest};

/// Environment variable carrying the startup id to a launched client.
pub const AUTOSTART_ID_ENV: &str = "DESKTOP_AUTOSTART_ID";

/// Split a command line into an argv using shell quoting rules.
pub fn parse_command_line(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command)
        .ok_or_else(|| SessionError::InvalidCommand(command.to_string()))?;
    if argv.is_empty() {
        return Err(SessionError::InvalidCommand(command.to_string()));
    }
    Ok(argv)
}

/// Start a client process and report its exit as `ProcessExited`.
pub fn spawn_client_process(request: &SpawnRequest, handle: SessionHandle) -> Result<u32> {
    let argv = parse_command_line(&request.command)?;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SessionError::InvalidCommand(request.command.clone()))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env(AUTOSTART_ID_ENV, &request.startup_id)
        .stdin(Stdio::null());
    if request.silent {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }

    let spawn_error = |source: std::io::Error| SessionError::Spawn {
        command: request.command.clone(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_error)?;
    let pid = child.id().ok_or_else(|| {
        spawn_error(std::io::Error::new(
            std::io::ErrorKind::Other,
            "process exited before its pid was read",
        ))
    })?;

    let startup_id = request.startup_id.clone();
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => ExitStatus::from(status),
            Err(e) => {
                warn!("Failed to wait for pid {}: {}", pid, e);
                ExitStatus::Code(1)
            }
        };
        debug!("pid {} ({}) exited: {}", pid, startup_id, status);
        let _ = handle.send(SessionEvent::ProcessExited {
            startup_id,
            pid,
            status,
        });
    });

    Ok(pid)
}

/// Send SIGTERM to `pid`.
pub fn send_sigterm(pid: u32) -> nix::Result<()> {
    let pid = i32::try_from(pid).map_err(|_| nix::errno::Errno::ESRCH)?;
    signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
}

/// Read-only view of the system process table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Command line of `pid`, quoted so it can be launched again.
    async fn command_line(&self, pid: u32) -> Option<String>;
}

/// [`ProcessTable`] backed by sysinfo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessTable;

#[async_trait]
impl ProcessTable for SysinfoProcessTable {
    async fn command_line(&self, pid: u32) -> Option<String> {
        tokio::task::spawn_blocking(move || {
            let pid = sysinfo::Pid::from_u32(pid);
            let mut system = sysinfo::System::new();
            if !system.refresh_process(pid) {
                return None;
            }
            let cmd = system.process(pid)?.cmd();
            if cmd.is_empty() {
                return None;
            }
            shlex::try_join(cmd.iter().map(String::as_str)).ok()
        })
        .await
        .ok()
        .flatten()
    }
}

/// Look up the command line of a peer, if one was asked for and the pid is known.
pub async fn describe_peer(
    table: &dyn ProcessTable,
    pid: Option<u32>,
    want_args: bool,
) -> Option<String> {
    match pid {
        Some(pid) if want_args => table.command_line(pid).await,
        _ => None,
    }
}

/// Shared handle to the process table used by the bus backend.
pub type SharedProcessTable = Arc<dyn ProcessTable>;
