//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod types;

pub use types::{
    LoggingConfig, MatchPolicy, PhaseConfig, RestartConfig, SessionConfig, ShutdownConfig,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Phase timeouts
    #[serde(default)]
    pub phases: PhaseConfig,
    /// Restart policy
    #[serde(default)]
    pub restart: RestartConfig,
    /// Logout behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.name.trim().is_empty() {
            anyhow::bail!("Session name must not be empty");
        }

        if self.session.panel_command.trim().is_empty() {
            anyhow::bail!("Panel command must not be empty");
        }

        if self.session.desktop_names.is_empty() {
            anyhow::bail!("At least one desktop name is required");
        }

        if self.phases.default_timeout_secs == 0 {
            anyhow::bail!("default_timeout_secs must be greater than 0");
        }

        if !(0..=255).contains(&self.restart.panel_reload_exit_code) {
            anyhow::bail!(
                "panel_reload_exit_code ({}) is not a valid exit code",
                self.restart.panel_reload_exit_code
            );
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        panel_command: Option<String>,
        extra_autostart_dirs: Vec<PathBuf>,
        show_all_output: bool,
    ) -> Self {
        if let Some(panel_command) = panel_command {
            self.session.panel_command = panel_command;
        }

        self.session.autostart_dirs.extend(extra_autostart_dirs);

        if show_all_output {
            self.session.show_all_output = true;
        }

        self
    }

    /// Grace period between the Exit phase and SIGTERM to leftovers
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.exit_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            session: SessionConfig::default(),
            phases: PhaseConfig::default(),
            restart: RestartConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default_config().unwrap();
        assert_eq!(config.session.name, "graphene");
        assert_eq!(config.restart.max_restarts, 5);
        assert_eq!(config.restart.panel_reload_exit_code, 120);
        assert_eq!(config.phases.default_timeout_secs, 10);
        assert_eq!(config.phases.query_end_session_timeout_secs, 1);
        assert_eq!(config.phases.applications_timeout_secs, 0);
        assert_eq!(config.exit_timeout(), Duration::from_secs(2));
        assert_eq!(config.session.match_policy, MatchPolicy::Loose);
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default_config().unwrap();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_exit_code() {
        let mut config = Config::default_config().unwrap();
        config.restart.panel_reload_exit_code = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_panel() {
        let mut config = Config::default_config().unwrap();
        config.session.panel_command = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[session]
name = "graphene-test"
panel_command = "/opt/panel"
desktop_names = ["Graphene"]
match_policy = "strict"

[restart]
max_restarts = 2
panel_reload_exit_code = 120
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.session.name, "graphene-test");
        assert_eq!(config.session.match_policy, MatchPolicy::Strict);
        assert_eq!(config.restart.max_restarts, 2);
        assert!(!config.restart.during_startup);
        assert_eq!(config.phases.default_timeout_secs, 10);
        assert!(config.session.autostart_dirs.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/graphene/session.toml").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::default_config().unwrap().with_overrides(
            Some("/opt/panel".to_string()),
            vec![PathBuf::from("/tmp/autostart")],
            true,
        );
        assert_eq!(config.session.panel_command, "/opt/panel");
        assert!(config
            .session
            .autostart_dirs
            .contains(&PathBuf::from("/tmp/autostart")));
        assert!(config.session.show_all_output);
    }
}
