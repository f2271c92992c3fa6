//! Configuration types for the cadence daemon.

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the scheduler daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Prompt store settings.
    pub store: StoreConfig,
    /// External agent invocation settings.
    pub agent: AgentConfig,
    /// Background scheduler loop settings.
    pub scheduler: SchedulerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Prompt store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the JSONL prompt store file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_data_path("prompts.jsonl"),
        }
    }
}

/// External agent invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent binary name or path.
    pub binary: PathBuf,
    /// Fixed arguments placed before the prompt text.
    pub args: Vec<String>,
    /// Per-dispatch timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("claude"),
            args: vec!["code".to_owned(), "-p".to_owned()],
            timeout_secs: 300,
        }
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks in seconds.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Optional log file (None = stderr only).
    pub file: Option<PathBuf>,
    /// Default log level filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_owned(),
        }
    }
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CadenceError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        toml::from_str(&contents)
            .map_err(|e| CadenceError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Default path for the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
    }
}

/// Resolve a file name under the platform config dir, falling back to the
/// current directory when no config dir is available.
fn default_data_path(file_name: &str) -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("cadence").join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
