//! `org.gnome.SessionManager` on `/org/gnome/SessionManager`

use tracing::{debug, info};
use zbus::message::Header;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::{fdo, interface, SignalContext};

use super::object_path;
use crate::logind::LogindClient;
use crate::session::{EndAction, SessionHandle, SessionRequest};

/// The root session manager object.
pub struct SessionManagerInterface {
    handle: SessionHandle,
    logind: Option<LogindClient>,
}

impl SessionManagerInterface {
    /// `logind` is only consulted by `CanShutdown`.
    pub fn new(handle: SessionHandle, logind: Option<LogindClient>) -> Self {
        Self { handle, logind }
    }
}

fn sender(header: &Header<'_>) -> fdo::Result<String> {
    header
        .sender()
        .map(|s| s.to_string())
        .ok_or_else(|| fdo::Error::InvalidArgs("message has no sender".to_string()))
}

#[interface(name = "org.gnome.SessionManager")]
impl SessionManagerInterface {
    async fn setenv(&self, variable: String, value: String) -> fdo::Result<()> {
        self.handle
            .request(|reply| SessionRequest::Setenv {
                variable,
                value,
                reply,
            })
            .await??;
        Ok(())
    }

    async fn initialization_error(&self, message: String, fatal: bool) -> fdo::Result<()> {
        self.handle
            .request(|reply| SessionRequest::InitializationError {
                message,
                fatal,
                reply,
            })
            .await?;
        Ok(())
    }

    async fn register_client(
        &self,
        #[zbus(header)] header: Header<'_>,
        app_id: String,
        client_startup_id: String,
    ) -> fdo::Result<OwnedObjectPath> {
        let sender = sender(&header)?;
        debug!("RegisterClient from {} ({:?}, {:?})", sender, app_id, client_startup_id);
        let path = self
            .handle
            .request(|reply| SessionRequest::RegisterClient {
                sender,
                app_id,
                startup_id: client_startup_id,
                reply,
            })
            .await?;
        object_path(&path)
    }

    async fn unregister_client(&self, client_id: ObjectPath<'_>) -> fdo::Result<()> {
        let object_path = client_id.to_string();
        self.handle
            .request(|reply| SessionRequest::UnregisterClient { object_path, reply })
            .await?;
        Ok(())
    }

    async fn inhibit(
        &self,
        #[zbus(header)] header: Header<'_>,
        app_id: String,
        toplevel_xid: u32,
        reason: String,
        flags: u32,
    ) -> fdo::Result<u32> {
        let sender = sender(&header)?;
        Ok(self
            .handle
            .request(|reply| SessionRequest::Inhibit {
                sender,
                app_id,
                toplevel_xid,
                reason,
                flags,
                reply,
            })
            .await?)
    }

    async fn uninhibit(&self, inhibit_cookie: u32) -> fdo::Result<()> {
        self.handle
            .request(|reply| SessionRequest::Uninhibit {
                cookie: inhibit_cookie,
                reply,
            })
            .await?;
        Ok(())
    }

    async fn is_inhibited(&self, flags: u32) -> fdo::Result<bool> {
        Ok(self
            .handle
            .request(|reply| SessionRequest::IsInhibited { flags, reply })
            .await?)
    }

    async fn get_clients(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        let paths = self
            .handle
            .request(|reply| SessionRequest::GetClients { reply })
            .await?;
        paths.iter().map(|p| object_path(p)).collect()
    }

    async fn get_inhibitors(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        let paths = self
            .handle
            .request(|reply| SessionRequest::GetInhibitors { reply })
            .await?;
        paths.iter().map(|p| object_path(p)).collect()
    }

    async fn get_current_client(
        &self,
        #[zbus(header)] header: Header<'_>,
    ) -> fdo::Result<OwnedObjectPath> {
        let sender = sender(&header)?;
        let path = self
            .handle
            .request(|reply| SessionRequest::GetCurrentClient { sender, reply })
            .await?;
        match path {
            Some(path) => object_path(&path),
            None => Err(fdo::Error::InvalidArgs(
                "caller is not a registered client".to_string(),
            )),
        }
    }

    async fn is_session_running(&self) -> fdo::Result<bool> {
        Ok(self
            .handle
            .request(|reply| SessionRequest::IsSessionRunning { reply })
            .await?)
    }

    async fn logout(&self, mode: u32) -> fdo::Result<()> {
        info!("Logout requested (mode {})", mode);
        self.handle
            .request(|reply| SessionRequest::Logout { mode, reply })
            .await??;
        Ok(())
    }

    async fn shutdown(&self) -> fdo::Result<()> {
        self.request_end(EndAction::PowerOff).await
    }

    async fn reboot(&self) -> fdo::Result<()> {
        self.request_end(EndAction::Reboot).await
    }

    async fn can_shutdown(&self) -> fdo::Result<bool> {
        let allowed = self
            .handle
            .request(|reply| SessionRequest::CanShutdown { reply })
            .await?;
        if !allowed {
            return Ok(false);
        }
        Ok(match &self.logind {
            Some(logind) => logind.can_shutdown().await,
            None => true,
        })
    }

    #[zbus(property)]
    async fn session_name(&self) -> fdo::Result<String> {
        Ok(self.properties().await?.session_name)
    }

    #[zbus(property)]
    async fn session_is_active(&self) -> fdo::Result<bool> {
        Ok(self.properties().await?.session_is_active)
    }

    #[zbus(property)]
    async fn inhibited_actions(&self) -> fdo::Result<u32> {
        Ok(self.properties().await?.inhibited_actions)
    }

    /// A client registered
    #[zbus(signal)]
    pub async fn client_added(ctxt: &SignalContext<'_>, id: ObjectPath<'_>) -> zbus::Result<()>;

    /// A client went away
    #[zbus(signal)]
    pub async fn client_removed(ctxt: &SignalContext<'_>, id: ObjectPath<'_>)
        -> zbus::Result<()>;

    /// An inhibitor was added
    #[zbus(signal)]
    pub async fn inhibitor_added(ctxt: &SignalContext<'_>, id: ObjectPath<'_>)
        -> zbus::Result<()>;

    /// An inhibitor was removed
    #[zbus(signal)]
    pub async fn inhibitor_removed(
        ctxt: &SignalContext<'_>,
        id: ObjectPath<'_>,
    ) -> zbus::Result<()>;

    /// Startup finished
    #[zbus(signal)]
    pub async fn session_running(ctxt: &SignalContext<'_>) -> zbus::Result<()>;

    /// The session is about to end
    #[zbus(signal)]
    pub async fn session_over(ctxt: &SignalContext<'_>) -> zbus::Result<()>;
}

impl SessionManagerInterface {
    async fn request_end(&self, action: EndAction) -> fdo::Result<()> {
        info!("{:?} requested", action);
        self.handle
            .request(|reply| SessionRequest::Shutdown { action, reply })
            .await??;
        Ok(())
    }

    async fn properties(&self) -> fdo::Result<crate::session::SessionProperties> {
        Ok(self
            .handle
            .request(|reply| SessionRequest::Properties { reply })
            .await?)
    }
}
