//! [`SessionBackend`] on top of a zbus connection and tokio.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::zvariant::ObjectPath;
use zbus::{Connection, SignalContext};

use super::{
    ClientInterface, ClientPrivateInterface, InhibitorInterface, SessionManagerInterface,
    CLIENT_PRIVATE_INTERFACE, MANAGER_PATH,
};
use crate::error::{Result, SessionError};
use crate::process::{self, SharedProcessTable};
use crate::session::{
    ClientSignal, OutboundSignal, PeerLookup, SessionBackend, SessionEvent, SessionHandle,
    SessionPhase, SpawnRequest, WatchId,
};

/// Production backend: exports objects, watches names, spawns processes.
pub struct ZbusBackend {
    connection: Connection,
    handle: SessionHandle,
    process_table: SharedProcessTable,
    watches: HashMap<WatchId, CancellationToken>,
    next_watch: u64,
}

impl ZbusBackend {
    /// Backend posting its completions to `handle`.
    pub fn new(connection: Connection, handle: SessionHandle, process_table: SharedProcessTable) -> Self {
        Self {
            connection,
            handle,
            process_table,
            watches: HashMap::new(),
            next_watch: 0,
        }
    }

    fn post_after(&self, delay: Duration, event: SessionEvent) {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.send(event);
        });
    }

    async fn emit_signal(&self, signal: OutboundSignal) -> zbus::Result<()> {
        let ctxt = SignalContext::new(&self.connection, MANAGER_PATH)?;
        match signal {
            OutboundSignal::ClientAdded(path) => {
                SessionManagerInterface::client_added(&ctxt, ObjectPath::try_from(path.as_str())?)
                    .await
            }
            OutboundSignal::ClientRemoved(path) => {
                SessionManagerInterface::client_removed(&ctxt, ObjectPath::try_from(path.as_str())?)
                    .await
            }
            OutboundSignal::InhibitorAdded(path) => {
                SessionManagerInterface::inhibitor_added(&ctxt, ObjectPath::try_from(path.as_str())?)
                    .await
            }
            OutboundSignal::InhibitorRemoved(path) => {
                SessionManagerInterface::inhibitor_removed(
                    &ctxt,
                    ObjectPath::try_from(path.as_str())?,
                )
                .await
            }
            OutboundSignal::SessionRunning => SessionManagerInterface::session_running(&ctxt).await,
            OutboundSignal::SessionOver => SessionManagerInterface::session_over(&ctxt).await,
            OutboundSignal::Client {
                destination,
                path,
                signal,
            } => {
                let (member, flags) = match signal {
                    ClientSignal::Stop => ("Stop", None),
                    ClientSignal::QueryEndSession(flags) => ("QueryEndSession", Some(flags)),
                    ClientSignal::EndSession(flags) => ("EndSession", Some(flags)),
                    ClientSignal::CancelEndSession(flags) => ("CancelEndSession", Some(flags)),
                };
                let destination = Some(destination.as_str());
                match flags {
                    None => {
                        self.connection
                            .emit_signal(destination, path.as_str(), CLIENT_PRIVATE_INTERFACE, member, &())
                            .await
                    }
                    Some(flags) => {
                        self.connection
                            .emit_signal(
                                destination,
                                path.as_str(),
                                CLIENT_PRIVATE_INTERFACE,
                                member,
                                &(flags,),
                            )
                            .await
                    }
                }
            }
        }
    }
}

/// Resolves once `name` has no owner on the bus.
async fn wait_for_name_loss(connection: &Connection, name: &str) -> zbus::Result<()> {
    let proxy = DBusProxy::new(connection).await?;
    let mut changes = proxy
        .receive_name_owner_changed_with_args(&[(0, name)])
        .await?;

    // Subscribe before checking, so a quit in between is not missed.
    if !proxy.name_has_owner(BusName::try_from(name)?).await? {
        return Ok(());
    }

    while let Some(change) = changes.next().await {
        if change.args()?.new_owner().is_none() {
            return Ok(());
        }
    }
    Err(zbus::Error::Failure(format!(
        "NameOwnerChanged stream for {} ended",
        name
    )))
}

async fn peer_pid(connection: &Connection, name: &str) -> Option<u32> {
    let proxy = DBusProxy::new(connection).await.ok()?;
    let bus_name = BusName::try_from(name).ok()?;
    match proxy.get_connection_unix_process_id(bus_name).await {
        Ok(pid) => Some(pid),
        Err(e) => {
            debug!("Cannot get pid of {}: {}", name, e);
            None
        }
    }
}

#[async_trait]
impl SessionBackend for ZbusBackend {
    fn spawn(&mut self, request: &SpawnRequest) -> Result<u32> {
        process::spawn_client_process(request, self.handle.clone())
    }

    fn schedule_launch(&mut self, startup_id: &str, token: u64, delay: Duration) {
        self.post_after(
            delay,
            SessionEvent::LaunchDue {
                startup_id: startup_id.to_string(),
                token,
            },
        );
    }

    fn schedule_phase_timeout(&mut self, phase: SessionPhase, epoch: u64, delay: Duration) {
        debug!("Phase {} times out in {:?}", phase, delay);
        self.post_after(delay, SessionEvent::PhaseTimeout { epoch });
    }

    async fn export_client(&mut self, startup_id: &str, path: &str) -> Result<()> {
        let server = self.connection.object_server();
        let added = server
            .at(path, ClientInterface::new(startup_id, self.handle.clone()))
            .await?;
        if !added {
            return Err(SessionError::Export {
                path: path.to_string(),
                reason: "path already in use".to_string(),
            });
        }
        if let Err(e) = server
            .at(path, ClientPrivateInterface::new(startup_id, self.handle.clone()))
            .await
        {
            let _ = server.remove::<ClientInterface, _>(path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn unexport_client(&mut self, path: &str) {
        let server = self.connection.object_server();
        if let Err(e) = server.remove::<ClientPrivateInterface, _>(path).await {
            debug!("Failed to remove ClientPrivate at {}: {}", path, e);
        }
        if let Err(e) = server.remove::<ClientInterface, _>(path).await {
            debug!("Failed to remove Client at {}: {}", path, e);
        }
    }

    async fn export_inhibitor(&mut self, cookie: u32, path: &str) -> Result<()> {
        let added = self
            .connection
            .object_server()
            .at(path, InhibitorInterface::new(cookie, self.handle.clone()))
            .await?;
        if !added {
            return Err(SessionError::Export {
                path: path.to_string(),
                reason: "path already in use".to_string(),
            });
        }
        Ok(())
    }

    async fn unexport_inhibitor(&mut self, path: &str) {
        if let Err(e) = self
            .connection
            .object_server()
            .remove::<InhibitorInterface, _>(path)
            .await
        {
            debug!("Failed to remove Inhibitor at {}: {}", path, e);
        }
    }

    fn watch_name(&mut self, startup_id: &str, dbus_name: &str) -> WatchId {
        self.next_watch += 1;
        let watch = WatchId(self.next_watch);
        let token = CancellationToken::new();
        self.watches.insert(watch, token.clone());

        let connection = self.connection.clone();
        let handle = self.handle.clone();
        let startup_id = startup_id.to_string();
        let dbus_name = dbus_name.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                lost = wait_for_name_loss(&connection, &dbus_name) => match lost {
                    Ok(()) => {
                        debug!("{} left the bus", dbus_name);
                        let _ = handle.send(SessionEvent::NameVanished { startup_id, watch });
                    }
                    Err(e) => warn!("Stopped watching {}: {}", dbus_name, e),
                },
            }
        });
        watch
    }

    fn unwatch_name(&mut self, watch: WatchId) {
        if let Some(token) = self.watches.remove(&watch) {
            token.cancel();
        }
    }

    fn resolve_peer(&mut self, lookup: PeerLookup) {
        let connection = self.connection.clone();
        let handle = self.handle.clone();
        let table = self.process_table.clone();
        tokio::spawn(async move {
            let pid = match lookup.known_pid {
                Some(pid) => Some(pid),
                None => peer_pid(&connection, &lookup.dbus_name).await,
            };
            let args = process::describe_peer(table.as_ref(), pid, lookup.want_args).await;
            let _ = handle.send(SessionEvent::PeerResolved {
                startup_id: lookup.startup_id,
                dbus_name: lookup.dbus_name,
                pid,
                args,
            });
        });
    }

    async fn emit(&mut self, signal: OutboundSignal) {
        let description = format!("{:?}", signal);
        if let Err(e) = self.emit_signal(signal).await {
            warn!("Failed to emit {}: {}", description, e);
        }
    }

    fn terminate(&mut self, pid: u32) {
        match process::send_sigterm(pid) {
            Ok(()) => debug!("Sent SIGTERM to pid {}", pid),
            Err(e) => debug!("Failed to signal pid {}: {}", pid, e),
        }
    }
}
