//! Autostart `.desktop` scanning
//!
//! Entries are collected from the XDG autostart directories. A file in a
//! later directory replaces one with the same file name from an earlier
//! directory, so user entries in `$XDG_CONFIG_HOME/autostart` win.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

const DESKTOP_ENTRY_GROUP: &str = "[Desktop Entry]";
const DEFAULT_PHASE: &str = "Applications";

/// Why a desktop file could not be used.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AutostartError {
    /// No `[Desktop Entry]` group
    #[error("missing [Desktop Entry] group")]
    MissingGroup,

    /// Not an application entry
    #[error("unsupported entry type {0:?}")]
    UnsupportedType(String),

    /// No `Exec` key
    #[error("missing Exec key")]
    MissingExec,
}

/// One program to launch at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutostartEntry {
    /// Basename of the `.desktop` file
    pub file_name: String,
    /// `Name`
    pub name: Option<String>,
    /// Command line with field codes removed
    pub exec: String,
    /// Phase to launch in
    pub phase: String,
    /// Restart after a crash
    pub auto_restart: bool,
    /// Delay before launching
    pub delay: Duration,
    /// Keep stdout/stderr
    pub show_output: bool,
}

impl AutostartEntry {
    /// Name used in log messages.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file_name)
    }
}

/// A parsed desktop file, before deciding whether it should run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopFile {
    hidden: bool,
    enabled: bool,
    only_show_in: Option<Vec<String>>,
    not_show_in: Vec<String>,
    entry: Option<AutostartEntry>,
}

impl DesktopFile {
    /// Whether this entry should be launched in one of `desktops`.
    pub fn should_autostart(&self, desktops: &[String]) -> bool {
        if self.hidden || !self.enabled {
            return false;
        }
        if let Some(only) = &self.only_show_in {
            return only.iter().any(|d| desktops.contains(d));
        }
        !self.not_show_in.iter().any(|d| desktops.contains(d))
    }

    /// The launchable entry, if the file has one.
    pub fn into_entry(self) -> Option<AutostartEntry> {
        self.entry
    }
}

/// Parse the `[Desktop Entry]` group of a desktop file.
pub fn parse_desktop_file(file_name: &str, content: &str) -> Result<DesktopFile, AutostartError> {
    let keys = parse_group(content, DESKTOP_ENTRY_GROUP).ok_or(AutostartError::MissingGroup)?;

    if let Some(kind) = keys.get("Type") {
        if kind != "Application" {
            return Err(AutostartError::UnsupportedType(kind.clone()));
        }
    }

    let hidden = keys.get("Hidden").is_some_and(|v| parse_bool(v));
    let enabled = keys
        .get("X-GNOME-Autostart-enabled")
        .map_or(true, |v| parse_bool(v));

    let entry = match keys.get("Exec").map(|e| strip_field_codes(e)) {
        Some(exec) if !exec.is_empty() => Some(AutostartEntry {
            file_name: file_name.to_string(),
            name: keys.get("Name").cloned(),
            exec,
            phase: keys
                .get("X-GNOME-Autostart-Phase")
                .filter(|p| !p.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_PHASE.to_string()),
            auto_restart: keys.get("X-GNOME-AutoRestart").is_some_and(|v| parse_bool(v)),
            delay: parse_delay(file_name, keys.get("X-GNOME-Autostart-Delay")),
            show_output: keys.get("Graphene-ShowOutput").is_some_and(|v| parse_bool(v)),
        }),
        // Hidden files only need to exist to mask an earlier entry.
        _ if hidden || !enabled => None,
        _ => return Err(AutostartError::MissingExec),
    };

    Ok(DesktopFile {
        hidden,
        enabled,
        only_show_in: keys.get("OnlyShowIn").map(|v| split_list(v)),
        not_show_in: keys.get("NotShowIn").map(|v| split_list(v)).unwrap_or_default(),
        entry,
    })
}

/// Key/value pairs of one group. Comments, blank lines and localized keys are skipped.
fn parse_group(content: &str, group: &str) -> Option<HashMap<String, String>> {
    let mut lines = content.lines().map(str::trim);
    lines.by_ref().find(|line| *line == group)?;

    let mut keys = HashMap::new();
    for line in lines {
        if line.starts_with('[') {
            break;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.contains('[') {
            continue;
        }
        keys.insert(key.to_string(), value.trim().to_string());
    }
    Some(keys)
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_delay(file_name: &str, value: Option<&String>) -> Duration {
    match value.map(|v| v.parse::<u64>()) {
        None => Duration::ZERO,
        Some(Ok(secs)) => Duration::from_secs(secs),
        Some(Err(_)) => {
            warn!("{}: ignoring invalid X-GNOME-Autostart-Delay", file_name);
            Duration::ZERO
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remove desktop-entry field codes (`%f`, `%U`, ...) and unescape `%%`.
pub fn strip_field_codes(exec: &str) -> String {
    let mut out = String::with_capacity(exec.len());
    let mut chars = exec.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                out.push('%');
                chars.next();
            }
            Some(code) if "fFuUdDnNickvm".contains(code) => {
                chars.next();
            }
            _ => out.push('%'),
        }
    }
    out.trim().to_string()
}

/// Autostart directories in scan order, lowest priority first.
pub fn autostart_dirs(extra: &[PathBuf]) -> Vec<PathBuf> {
    let system = std::env::var("XDG_CONFIG_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/etc/xdg".to_string());

    // XDG_CONFIG_DIRS lists the most important directory first.
    let mut dirs: Vec<PathBuf> = system
        .split(':')
        .filter(|d| !d.is_empty())
        .rev()
        .map(|d| Path::new(d).join("autostart"))
        .collect();
    dirs.extend(extra.iter().cloned());
    if let Some(config) = dirs::config_dir() {
        dirs.push(config.join("autostart"));
    }
    dirs
}

fn desktop_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "desktop"))
        .collect();
    files.sort();
    Ok(files)
}

/// Collect the entries to launch from `dirs`, for the given desktop names.
pub fn load_autostart_entries(dirs: &[PathBuf], desktops: &[String]) -> Vec<AutostartEntry> {
    let mut by_name: BTreeMap<String, Option<AutostartEntry>> = BTreeMap::new();

    for dir in dirs {
        let files = match desktop_files(dir) {
            Ok(files) => files,
            Err(e) => {
                debug!("Skipping autostart directory {}: {}", dir.display(), e);
                continue;
            }
        };

        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            match parse_desktop_file(&file_name, &content) {
                Ok(file) => {
                    let entry = if file.should_autostart(desktops) {
                        file.into_entry()
                    } else {
                        debug!("{} is disabled for this session", file_name);
                        None
                    };
                    by_name.insert(file_name, entry);
                }
                Err(e) => warn!("Ignoring {}: {}", path.display(), e),
            }
        }
    }

    by_name.into_values().flatten().collect()
}
