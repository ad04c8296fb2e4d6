//! Engine configuration
//!
//! Loaded from `config.toml` in the config directory (see [`crate::paths`]).
//! A missing file yields the defaults; every field is optional.
//!
//! ```toml
//! default_timeout_secs = 30
//! poll_interval_ms = 100
//! base_snap = "snapd"
//! ```

use crate::paths;
use anyhow::{Context, Result};
use declarative::ApplyContext;
use serde::{Deserialize, Serialize};
use snapkit::Channel;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Budget for each asynchronous effect, in seconds
    pub default_timeout_secs: u64,

    /// Delay between two polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Snap whose slots plugs connect to when no target is given
    pub base_snap: String,

    /// Channel used when `installed` is called without one
    pub default_channel: String,

    /// Shortened budget for a second condition on a service that was
    /// already driven by the same call, in seconds
    pub settle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_secs: 10,
            poll_interval_ms: 250,
            base_snap: "core".to_string(),
            default_channel: "latest/stable".to_string(),
            settle_timeout_secs: 1,
        }
    }
}

impl Config {
    /// Load the config file, or return defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid config format")?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        log::debug!("Saved config to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Channel::parse(&self.default_channel).context("Invalid default_channel")?;
        anyhow::ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        anyhow::ensure!(!self.base_snap.is_empty(), "base_snap must not be empty");
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }

    /// Apply context carrying the configured budgets
    pub fn context(&self, dry_run: bool) -> ApplyContext {
        ApplyContext::new(dry_run)
            .with_timeout(self.timeout())
            .with_settle_timeout(self.settle_timeout())
            .with_poll_interval(self.poll_interval())
    }
}
