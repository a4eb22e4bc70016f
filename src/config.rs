//! Daemon configuration.
//!
//! Loaded from a TOML file (by default `workspace-sync.toml` in the current
//! directory, when present), then overridden by command-line flags:
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 3002
//! workspace_root = "./code-server/workspace"
//!
//! [process]
//! command = "npm"
//! args = ["run", "dev"]
//! flush_interval_secs = 5
//!
//! [watcher]
//! debounce_ms = 100
//! exclude = ["node_modules", ".next", ".git"]
//!
//! [protocol]
//! structured_notices = false
//! include_path_on_missing = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::tree::{ExclusionRules, DEFAULT_EXCLUDES};

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "workspace-sync.toml";

/// Top-level daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory that is watched, served and used as the dev server's cwd
    pub workspace_root: PathBuf,
    pub process: ProcessConfig,
    pub watcher: WatcherConfig,
    pub protocol: ProtocolConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3002,
            workspace_root: PathBuf::from("./code-server/workspace"),
            process: ProcessConfig::default(),
            watcher: WatcherConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

/// Dev server supervision settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Spawn a dev server for each session
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Seconds between stderr flushes
    pub flush_interval_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "npm".to_string(),
            args: vec!["run".to_string(), "dev".to_string()],
            flush_interval_secs: 5,
        }
    }
}

impl ProcessConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

/// File watcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Window over which raw notifications are gathered and repeats
    /// collapsed (default: 100ms)
    pub debounce_ms: u64,
    /// Path segments excluded from snapshots and events
    pub exclude: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WatcherConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn exclusion_rules(&self) -> ExclusionRules {
        ExclusionRules::new(self.exclude.iter().cloned())
    }
}

/// Wire-compatibility switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Send process exit / spawn failure as JSON instead of plain text
    pub structured_notices: bool,
    /// Echo the requested path in `getFile` failure replies
    pub include_path_on_missing: bool,
}

impl DaemonConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path`, or from the default file if it exists, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    tracing::info!("Using configuration from {}", default.display());
                    Self::load_from(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(SyncError::Config {
                message: "port must be non-zero".to_string(),
            });
        }
        if self.process.enabled {
            if self.process.command.trim().is_empty() {
                return Err(SyncError::Config {
                    message: "process.command must not be empty".to_string(),
                });
            }
            if self.process.flush_interval_secs == 0 {
                return Err(SyncError::Config {
                    message: "process.flush_interval_secs must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// `host:port` for display, with IPv6 literals bracketed
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
