//! Configuration file discovery and command-line overrides.

use af_core::{Config, Mode};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_PATHS: &[&str] = &[
    "./archiveforge.toml",
    "~/.config/archiveforge/config.toml",
    "/etc/archiveforge/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .check()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => {
            tracing::debug!("Using config file {:?}", path);
            load_config(&path)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            let config = Config::default();
            for warning in config.validate() {
                tracing::warn!("{warning}");
            }
            Ok(config)
        }
    }
}

/// First default location that exists.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
        .find(|p| p.exists())
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<Mode>,
    pub jobs: Option<usize>,
    pub log: Option<PathBuf>,
}

impl Overrides {
    /// Apply to `config`, leaving unset fields untouched.
    pub fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.derive.mode = mode;
        }
        if let Some(jobs) = self.jobs {
            config.derive.concurrency = jobs;
        }
        if let Some(log) = &self.log {
            config.log.error_log = PathBuf::from(shellexpand::tilde(&log.to_string_lossy()).into_owned());
        }
    }
}
