//! systemd-logind D-Bus client
//!
//! Used after the session has ended to power off or reboot, and to answer
//! `CanShutdown`.

use anyhow::{Context, Result};
use tracing::{debug, info};
use zbus::{proxy, Connection};

/// systemd-logind Manager interface
#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    /// Power off the machine
    #[zbus(name = "PowerOff")]
    fn power_off(&self, interactive: bool) -> zbus::Result<()>;

    /// Reboot the machine
    #[zbus(name = "Reboot")]
    fn reboot(&self, interactive: bool) -> zbus::Result<()>;

    /// "yes", "no", "challenge" or "na"
    #[zbus(name = "CanPowerOff")]
    fn can_power_off(&self) -> zbus::Result<String>;

    #[zbus(name = "CanReboot")]
    fn can_reboot(&self) -> zbus::Result<String>;
}

/// systemd-logind client
#[derive(Clone)]
pub struct LogindClient {
    manager_proxy: LoginManagerProxy<'static>,
}

impl LogindClient {
    /// Connect to logind on the system bus
    pub async fn connect() -> Result<Self> {
        debug!("Connecting to systemd-logind via D-Bus");

        let connection = Connection::system()
            .await
            .context("Failed to connect to system D-Bus")?;

        let manager_proxy = LoginManagerProxy::new(&connection)
            .await
            .context("Failed to create logind manager proxy")?;

        Ok(Self { manager_proxy })
    }

    /// Whether the user may power off or reboot.
    ///
    /// A failed query counts as allowed; logind itself has the final say
    /// when the action is requested.
    pub async fn can_shutdown(&self) -> bool {
        let power_off = self.manager_proxy.can_power_off().await;
        let reboot = self.manager_proxy.can_reboot().await;
        match (power_off, reboot) {
            (Ok(power_off), Ok(reboot)) => allows(&power_off) || allows(&reboot),
            (Err(e), _) | (_, Err(e)) => {
                debug!("logind capability query failed: {}", e);
                true
            }
        }
    }

    /// Power off the machine
    pub async fn power_off(&self) -> Result<()> {
        info!("Requesting power off from systemd-logind");
        self.manager_proxy
            .power_off(false)
            .await
            .context("Failed to call PowerOff D-Bus method")
    }

    /// Reboot the machine
    pub async fn reboot(&self) -> Result<()> {
        info!("Requesting reboot from systemd-logind");
        self.manager_proxy
            .reboot(false)
            .await
            .context("Failed to call Reboot D-Bus method")
    }
}

fn allows(answer: &str) -> bool {
    matches!(answer, "yes" | "challenge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_answers() {
        assert!(allows("yes"));
        assert!(allows("challenge"));
        assert!(!allows("no"));
        assert!(!allows("na"));
    }
}
