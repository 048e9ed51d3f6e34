//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for batchline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub workers: WorkersConfig,
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Workers when `--workers` is not given (unset: CPU count, at most 8)
    pub default: Option<usize>,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default: None,
            max: 64,
        }
    }
}

impl WorkersConfig {
    /// Effective default worker count, never above `max`.
    pub fn default_workers(&self) -> usize {
        self.default
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
                    .min(8)
            })
            .min(self.max)
    }

    /// Pick the worker count: CLI value if given, else the configured default,
    /// capped at `max`. Zero is rejected.
    pub fn resolve(&self, requested: Option<usize>) -> Result<usize> {
        let n = requested.unwrap_or_else(|| self.default_workers());
        if n == 0 {
            anyhow::bail!("worker count must be at least 1");
        }
        if n > self.max {
            log::warn!("{n} workers requested, capping at {}", self.max);
            return Ok(self.max);
        }
        Ok(n)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint file, relative to the working directory unless absolute
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("status.json"),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./batchline.toml (current directory)
    /// 2. ~/.config/batchline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("batchline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "batchline") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers.max == 0 {
            anyhow::bail!("workers.max must be at least 1");
        }
        if let Some(default) = self.workers.default {
            if default > self.workers.max {
                anyhow::bail!(
                    "workers.default ({default}) exceeds workers.max ({})",
                    self.workers.max
                );
            }
        }
        Ok(())
    }
}
