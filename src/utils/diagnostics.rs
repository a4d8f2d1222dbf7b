//! Startup diagnostics

use sysinfo::System;
use tracing::{info, warn};

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,
    /// Kernel version string
    pub kernel_version: String,
    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Session-related environment inherited from the display manager.
#[derive(Debug, Clone, Default)]
pub struct SessionEnvironment {
    /// `XDG_SESSION_TYPE`
    pub session_type: Option<String>,
    /// `XDG_CURRENT_DESKTOP`
    pub current_desktop: Option<String>,
    /// `DBUS_SESSION_BUS_ADDRESS`
    pub bus_address: Option<String>,
    /// `WAYLAND_DISPLAY` or `DISPLAY`
    pub display: Option<String>,
}

impl SessionEnvironment {
    /// Read from the process environment
    pub fn gather() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            session_type: var("XDG_SESSION_TYPE"),
            current_desktop: var("XDG_CURRENT_DESKTOP"),
            bus_address: var("DBUS_SESSION_BUS_ADDRESS"),
            display: var("WAYLAND_DISPLAY").or_else(|| var("DISPLAY")),
        }
    }

    /// Problems worth warning about before starting clients
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if self.bus_address.is_none() {
            problems.push("DBUS_SESSION_BUS_ADDRESS is not set");
        }
        if self.display.is_none() {
            problems.push("neither WAYLAND_DISPLAY nor DISPLAY is set");
        }
        problems
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics() {
    let sys = SystemInfo::gather();
    info!("=== System Information ===");
    info!("  OS: {} {}", sys.os_name, sys.os_version);
    info!("  Kernel: {}", sys.kernel_version);
    info!("  Hostname: {}", sys.hostname);

    let env = SessionEnvironment::gather();
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(unset)".to_string());
    info!("=== Environment ===");
    info!("  Session type: {}", show(&env.session_type));
    info!("  Desktop: {}", show(&env.current_desktop));
    info!("  Display: {}", show(&env.display));
    info!("  Session bus: {}", show(&env.bus_address));
    for problem in env.problems() {
        warn!("  {}", problem);
    }
}
