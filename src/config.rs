//! Session Configuration
//!
//! Launch command, timeouts and search paths for the Claude CLI session.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SessionError, SessionResult};

/// Default executable name
pub const DEFAULT_COMMAND: &str = "claude";

/// Default per-request timeout (10 minutes)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Flags selecting non-interactive streaming JSON mode with bypassed permission prompts
pub const DEFAULT_ARGS: &[&str] = &[
    "-p",
    "--output-format",
    "stream-json",
    "--input-format",
    "stream-json",
    "--include-partial-messages",
    "--verbose",
    "--permission-mode",
    "bypassPermissions",
];

/// Configuration for a [`SessionManager`](crate::session::SessionManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Executable name or path
    pub command: String,
    /// Arguments passed on every launch
    pub args: Vec<String>,
    /// Upper bound for a single run
    pub request_timeout_ms: u64,
    /// How long teardown waits for the process to exit
    pub shutdown_grace_ms: u64,
    /// How long teardown waits for the stderr pump to drain
    pub pump_drain_ms: u64,
    /// Working directory used when a run does not supply one
    pub default_working_dir: Option<PathBuf>,
    /// Additional directories searched for the executable
    pub extra_search_dirs: Vec<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            shutdown_grace_ms: 1000,
            pump_drain_ms: 1000,
            default_working_dir: None,
            extra_search_dirs: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content).map_err(|e| {
            SessionError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!("Loaded session config from {:?}", path);
        Ok(config)
    }

    /// Load `<config_dir>/claude-session/config.toml` if it exists, otherwise defaults
    pub fn load_default() -> SessionResult<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                debug!("No session config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Location of the default config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("claude-session").join("config.toml"))
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_working_dir = Some(dir.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn pump_drain(&self) -> Duration {
        Duration::from_millis(self.pump_drain_ms)
    }

    /// Reject values that would make every run fail
    pub fn validate(&self) -> SessionResult<()> {
        if self.command.trim().is_empty() {
            return Err(SessionError::InvalidConfig("command must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.command, "claude");
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert!(config.args.iter().any(|a| a == "stream-json"));
        assert!(config.args.iter().any(|a| a == "bypassPermissions"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "command = \"claude-dev\"\nrequest_timeout_ms = 5000\n").unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.command, "claude-dev");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        // Unspecified fields keep their defaults
        assert_eq!(config.args.len(), DEFAULT_ARGS.len());
        assert_eq!(config.shutdown_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "request_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            SessionConfig::load(&path),
            Err(SessionError::InvalidConfig(_))
        ));

        let config = SessionConfig::default().with_command("  ");
        assert!(config.validate().is_err());
    }
}
