//! Driver configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::expand_env_refs;

const DEFAULT_TOOL_BINARY: &str = "/curvefs/tools/sbin/curvefs_tool";
const DEFAULT_TOOL_CONF: &str = "/curvefs/conf/tools.conf";
const DEFAULT_CLIENT_BINARY: &str = "/curvefs/client/sbin/curve-fuse";
const DEFAULT_CLIENT_CONF: &str = "/curvefs/conf/client.conf";
const DEFAULT_CACHE_DIR_PREFIX: &str = "/curvefs/client/data/cache/";
const DEFAULT_UMOUNT_BINARY: &str = "umount";
const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level driver configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DriverConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Management tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// FUSE client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Settings for the filesystem management tool (`curvefs_tool`)
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Path of the management executable
    #[serde(default = "default_tool_binary")]
    pub binary: PathBuf,

    /// Tool config used when the storage class sets no `toolConfPath`
    #[serde(default = "default_tool_conf")]
    pub conf_path: String,
}

fn default_tool_binary() -> PathBuf {
    PathBuf::from(DEFAULT_TOOL_BINARY)
}

fn default_tool_conf() -> String {
    DEFAULT_TOOL_CONF.to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: default_tool_binary(),
            conf_path: default_tool_conf(),
        }
    }
}

/// Settings for the FUSE client (`curve-fuse`) and mount cleanup
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Path of the FUSE client executable
    #[serde(default = "default_client_binary")]
    pub binary: PathBuf,

    /// Base client config. Per-mount copies are written next to it as
    /// `<conf_path>.<mount-uuid>`.
    #[serde(default = "default_client_conf")]
    pub conf_path: String,

    /// Per-mount cache directories live at `<cache_dir_prefix><mount-uuid>`
    #[serde(default = "default_cache_dir_prefix")]
    pub cache_dir_prefix: String,

    /// Executable used to detach a mount
    #[serde(default = "default_umount_binary")]
    pub umount_binary: PathBuf,

    /// Deadline for removing per-mount files after unmount (e.g. "30s")
    #[serde(default = "default_cleanup_timeout", with = "humantime_serde")]
    pub cleanup_timeout: Duration,
}

fn default_client_binary() -> PathBuf {
    PathBuf::from(DEFAULT_CLIENT_BINARY)
}

fn default_client_conf() -> String {
    DEFAULT_CLIENT_CONF.to_string()
}

fn default_cache_dir_prefix() -> String {
    DEFAULT_CACHE_DIR_PREFIX.to_string()
}

fn default_umount_binary() -> PathBuf {
    PathBuf::from(DEFAULT_UMOUNT_BINARY)
}

fn default_cleanup_timeout() -> Duration {
    DEFAULT_CLEANUP_TIMEOUT
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            binary: default_client_binary(),
            conf_path: default_client_conf(),
            cache_dir_prefix: default_cache_dir_prefix(),
            umount_binary: default_umount_binary(),
            cleanup_timeout: default_cleanup_timeout(),
        }
    }
}

impl ClientConfig {
    /// Per-mount copy of the client config
    pub fn mount_conf_path(&self, mount_uuid: &str) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.conf_path, mount_uuid))
    }

    /// Per-mount cache directory
    pub fn mount_cache_dir(&self, mount_uuid: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.cache_dir_prefix, mount_uuid))
    }
}

impl DriverConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_refs(content)?;
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.binary.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "tool.binary cannot be empty".to_string(),
            ));
        }
        if self.tool.conf_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "tool.conf_path cannot be empty".to_string(),
            ));
        }
        if self.client.binary.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.binary cannot be empty".to_string(),
            ));
        }
        if self.client.conf_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "client.conf_path cannot be empty".to_string(),
            ));
        }
        if self.client.umount_binary.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.umount_binary cannot be empty".to_string(),
            ));
        }
        if self.client.cleanup_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "client.cleanup_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
