//! Engine configuration
//!
//! Configuration is read from `ifcmesh.toml`. Every field is optional in the
//! file and falls back to the defaults below.

use crate::process::PollBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Filename looked up by [`EngineConfig::load_from_dir`]
pub const CONFIG_FILENAME: &str = "ifcmesh.toml";

/// Version this crate expects native engines to report
pub const ENGINE_VERSION: &str = "0.3.0-rc3";

/// Default number of empty polls before a response wait gives up
pub const DEFAULT_MAX_POLL_ITERATIONS: u64 = 20_000;

/// Configuration shared by the transports and the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of empty polls tolerated while waiting for a response
    pub max_poll_iterations: u64,
    /// Sleep between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Wall-clock limit for a response wait; replaces the poll count when set
    pub deadline_ms: Option<u64>,
    /// Log every command and response at debug level
    pub log_traffic: bool,
    /// Version string compared against native engines
    pub engine_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_poll_iterations: DEFAULT_MAX_POLL_ITERATIONS,
            poll_interval_ms: 1,
            deadline_ms: None,
            log_traffic: false,
            engine_version: ENGINE_VERSION.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseToml {
                path: path.to_path_buf(),
                source: e,
            })?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Load `ifcmesh.toml` from a directory.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = dir.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Set the poll iteration bound
    pub fn with_max_poll_iterations(mut self, iterations: u64) -> Self {
        self.max_poll_iterations = iterations;
        self
    }

    /// Set the sleep between polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Use a wall-clock deadline instead of the poll count
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    /// Enable or disable traffic logging
    pub fn with_traffic_logging(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Set the version string native engines must report
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Budget for a single response wait
    pub fn poll_budget(&self) -> PollBudget {
        let interval = Duration::from_millis(self.poll_interval_ms);
        match self.deadline_ms {
            Some(ms) => PollBudget::Deadline {
                timeout: Duration::from_millis(ms),
                interval,
            },
            None => PollBudget::Iterations {
                max: self.max_poll_iterations,
                interval,
            },
        }
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
}
