//! Wiring: bus connection, name ownership, autostart scan and the session task.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{info, warn};
use zbus::fdo::RequestNameFlags;
use zbus::Connection;

use crate::autostart;
use crate::config::Config;
use crate::dbus::{SessionManagerInterface, ZbusBackend, MANAGER_PATH, SERVICE_NAME};
use crate::logind::LogindClient;
use crate::process::SysinfoProcessTable;
use crate::session::{
    driver, EndAction, SessionEvent, SessionExit, SessionHandle, SessionManager, SessionOutcome,
};

/// Run a whole session: from acquiring the bus name until every client is gone.
pub async fn run_session(config: Config) -> Result<SessionExit> {
    let config = Arc::new(config);

    let connection = Connection::session()
        .await
        .context("Failed to connect to the D-Bus session bus")?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(events_tx);

    let logind = match LogindClient::connect().await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("systemd-logind unavailable, Shutdown and Reboot will only log out: {:#}", e);
            None
        }
    };

    connection
        .object_server()
        .at(
            MANAGER_PATH,
            SessionManagerInterface::new(handle.clone(), logind.clone()),
        )
        .await
        .context("Failed to export the session manager object")?;

    connection
        .request_name_with_flags(SERVICE_NAME, RequestNameFlags::DoNotQueue.into())
        .await
        .context(format!("Failed to acquire {}", SERVICE_NAME))?;
    info!("Acquired bus name {}", SERVICE_NAME);

    spawn_signal_listener(handle.clone())?;

    let dirs = autostart::autostart_dirs(&config.session.autostart_dirs);
    let entries = autostart::load_autostart_entries(&dirs, &config.session.desktop_names);
    info!(
        "Found {} autostart entries in {} directories",
        entries.len(),
        dirs.len()
    );

    let backend = ZbusBackend::new(connection.clone(), handle, Arc::new(SysinfoProcessTable));
    let manager = SessionManager::new(config.clone(), backend, entries);
    let exit = driver::run(manager, events_rx, config.exit_timeout()).await;

    if exit.outcome == SessionOutcome::Clean {
        if let Some(logind) = &logind {
            let result = match exit.action {
                EndAction::Logout => Ok(()),
                EndAction::PowerOff => logind.power_off().await,
                EndAction::Reboot => logind.reboot().await,
            };
            if let Err(e) = result {
                warn!("{:#}", e);
            }
        }
    }

    Ok(exit)
}

/// SIGTERM and SIGINT end the session cleanly.
fn spawn_signal_listener(handle: SessionHandle) -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM"),
            _ = interrupt.recv() => info!("Received SIGINT"),
        }
        let _ = handle.send(SessionEvent::Terminate);
    });
    Ok(())
}
