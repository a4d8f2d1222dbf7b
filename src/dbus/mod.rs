//! D-Bus surface of the session manager
//!
//! Every object here is a thin shim: method calls become
//! [`SessionRequest`](crate::session::SessionRequest)s on the session task and
//! the replies are translated back into D-Bus types. [`ZbusBackend`] is the
//! other direction, carrying out the core's side effects on the bus.

use zbus::fdo;
use zbus::zvariant::OwnedObjectPath;

pub mod backend;
pub mod client;
pub mod inhibitor;
pub mod manager;

pub use backend::ZbusBackend;
pub use client::{ClientInterface, ClientPrivateInterface};
pub use inhibitor::InhibitorInterface;
pub use manager::SessionManagerInterface;

/// Well-known bus name
pub const SERVICE_NAME: &str = "org.gnome.SessionManager";

/// Path of the manager object
pub const MANAGER_PATH: &str = "/org/gnome/SessionManager";

/// Per-client interface used to talk to the client itself
pub const CLIENT_PRIVATE_INTERFACE: &str = "org.gnome.SessionManager.ClientPrivate";

/// Object paths cannot be empty; `/` stands in for "none".
pub(crate) fn object_path(path: &str) -> fdo::Result<OwnedObjectPath> {
    let path = if path.is_empty() { "/" } else { path };
    OwnedObjectPath::try_from(path.to_string())
        .map_err(|e| fdo::Error::Failed(format!("invalid object path {:?}: {}", path, e)))
}
