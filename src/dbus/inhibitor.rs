//! Per-inhibitor objects at `/org/gnome/SessionManager/Inhibitor<cookie>`

use zbus::zvariant::OwnedObjectPath;
use zbus::{fdo, interface};

use super::object_path;
use crate::session::{InhibitorInfo, SessionHandle, SessionRequest};

/// `org.gnome.SessionManager.Inhibitor`
pub struct InhibitorInterface {
    cookie: u32,
    handle: SessionHandle,
}

impl InhibitorInterface {
    /// Object serving the inhibitor with `cookie`.
    pub fn new(cookie: u32, handle: SessionHandle) -> Self {
        Self { cookie, handle }
    }

    async fn info(&self) -> fdo::Result<InhibitorInfo> {
        let cookie = self.cookie;
        self.handle
            .request(|reply| SessionRequest::InhibitorInfo { cookie, reply })
            .await?
            .ok_or_else(|| fdo::Error::UnknownObject(format!("inhibitor {} is gone", cookie)))
    }
}

#[interface(name = "org.gnome.SessionManager.Inhibitor")]
impl InhibitorInterface {
    async fn get_app_id(&self) -> fdo::Result<String> {
        Ok(self.info().await?.app_id)
    }

    async fn get_client_id(&self) -> fdo::Result<OwnedObjectPath> {
        object_path(&self.info().await?.client_path)
    }

    async fn get_reason(&self) -> fdo::Result<String> {
        Ok(self.info().await?.reason)
    }

    async fn get_flags(&self) -> fdo::Result<u32> {
        Ok(self.info().await?.flags)
    }

    async fn get_toplevel_xid(&self) -> fdo::Result<u32> {
        Ok(self.info().await?.toplevel_xid)
    }
}
