//! Configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::transport::codec::MAX_LINE_BYTES;
use crate::{AppError, Result};

/// Timeout values (seconds) for control exchanges.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Window an outbound control request waits for its response.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
        }
    }
}

fn default_request_seconds() -> u64 {
    60
}

/// Resource limits for framing, queues, and inbound dispatch.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LimitConfig {
    /// Maximum accepted inbound line length in bytes.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Capacity of the transport and router output queues.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Cap on concurrently running inbound dispatch tasks; 0 means unbounded.
    #[serde(default)]
    pub max_concurrent_dispatches: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: default_max_line_bytes(),
            channel_capacity: default_channel_capacity(),
            max_concurrent_dispatches: 0,
        }
    }
}

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_channel_capacity() -> usize {
    64
}

/// Behaviour applied to tools matched by neither permission list.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultBehavior {
    /// Allow unlisted tools.
    Allow,
    /// Deny unlisted tools.
    #[default]
    Deny,
}

/// Static tool permission rules used by the binary's permission handler.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionConfig {
    /// Fallback for tools in neither list.
    #[serde(default)]
    pub default: DefaultBehavior,
    /// Tools that are always allowed.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Tools that are always denied; wins over `allowed_tools`.
    #[serde(default)]
    pub denied_tools: Vec<String>,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ControlConfig {
    /// Host CLI binary (e.g., `claude`).
    pub host_cli: String,
    /// Arguments passed to the host CLI.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Working directory of the host process.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Control exchange timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Framing and concurrency limits.
    #[serde(default)]
    pub limits: LimitConfig,
    /// Static tool permission rules.
    #[serde(default)]
    pub permissions: PermissionConfig,
}

impl ControlConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Outbound control request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }

        if self.limits.max_line_bytes == 0 {
            return Err(AppError::Config(
                "limits.max_line_bytes must be greater than zero".into(),
            ));
        }

        if self.limits.channel_capacity == 0 {
            return Err(AppError::Config(
                "limits.channel_capacity must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}

/// Runtime settings consumed by [`ControlClient`](crate::control::client::ControlClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Window an outbound request waits for its correlated response.
    pub request_timeout: Duration,
    /// Capacity of the router's domain and error outputs.
    pub channel_capacity: usize,
    /// Optional cap on concurrently running inbound dispatch tasks.
    pub max_concurrent_dispatches: Option<usize>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(default_request_seconds()),
            channel_capacity: default_channel_capacity(),
            max_concurrent_dispatches: None,
        }
    }
}

impl From<&ControlConfig> for ClientSettings {
    fn from(config: &ControlConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            channel_capacity: config.limits.channel_capacity,
            max_concurrent_dispatches: match config.limits.max_concurrent_dispatches {
                0 => None,
                n => Some(n),
            },
        }
    }
}
