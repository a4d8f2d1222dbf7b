//! Per-client objects at `/org/gnome/SessionManager/Client<id>`

use zbus::{fdo, interface, SignalContext};

use crate::session::{ClientInfo, SessionHandle, SessionRequest};

/// `org.gnome.SessionManager.Client`
pub struct ClientInterface {
    startup_id: String,
    handle: SessionHandle,
}

impl ClientInterface {
    /// Object serving the client with `startup_id`.
    pub fn new(startup_id: impl Into<String>, handle: SessionHandle) -> Self {
        Self {
            startup_id: startup_id.into(),
            handle,
        }
    }

    async fn info(&self) -> fdo::Result<ClientInfo> {
        let startup_id = self.startup_id.clone();
        self.handle
            .request(|reply| SessionRequest::ClientInfo { startup_id, reply })
            .await?
            .ok_or_else(|| fdo::Error::UnknownObject(format!("client {} is gone", self.startup_id)))
    }
}

#[interface(name = "org.gnome.SessionManager.Client")]
impl ClientInterface {
    async fn get_app_id(&self) -> fdo::Result<String> {
        Ok(self.info().await?.app_id)
    }

    async fn get_startup_id(&self) -> fdo::Result<String> {
        Ok(self.info().await?.startup_id)
    }

    async fn get_restart_style_hint(&self) -> fdo::Result<u32> {
        Ok(self.info().await?.restart_style_hint)
    }

    async fn get_unix_process_id(&self) -> fdo::Result<u32> {
        Ok(self.info().await?.process_id)
    }

    async fn get_status(&self) -> fdo::Result<u32> {
        Ok(self.info().await?.status)
    }

    async fn stop(&self) -> fdo::Result<()> {
        let startup_id = self.startup_id.clone();
        self.handle
            .request(|reply| SessionRequest::StopClient { startup_id, reply })
            .await??;
        Ok(())
    }
}

/// `org.gnome.SessionManager.ClientPrivate`
///
/// The signals declared here are sent to the client's own bus name by
/// [`ZbusBackend`](super::ZbusBackend).
pub struct ClientPrivateInterface {
    startup_id: String,
    handle: SessionHandle,
}

impl ClientPrivateInterface {
    /// Object serving the client with `startup_id`.
    pub fn new(startup_id: impl Into<String>, handle: SessionHandle) -> Self {
        Self {
            startup_id: startup_id.into(),
            handle,
        }
    }
}

#[interface(name = "org.gnome.SessionManager.ClientPrivate")]
impl ClientPrivateInterface {
    async fn end_session_response(&self, is_ok: bool, reason: String) -> fdo::Result<()> {
        let startup_id = self.startup_id.clone();
        self.handle
            .request(|reply| SessionRequest::EndSessionResponse {
                startup_id,
                is_ok,
                reason,
                reply,
            })
            .await?;
        Ok(())
    }

    /// Quit now
    #[zbus(signal)]
    pub async fn stop(ctxt: &SignalContext<'_>) -> zbus::Result<()>;

    /// Reply with `EndSessionResponse`
    #[zbus(signal)]
    pub async fn query_end_session(ctxt: &SignalContext<'_>, flags: u32) -> zbus::Result<()>;

    /// Save state, reply with `EndSessionResponse`, then quit
    #[zbus(signal)]
    pub async fn end_session(ctxt: &SignalContext<'_>, flags: u32) -> zbus::Result<()>;

    /// The logout was called off
    #[zbus(signal)]
    pub async fn cancel_end_session(ctxt: &SignalContext<'_>, flags: u32) -> zbus::Result<()>;
}
