//! Store configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables (PERSIST_* prefix)
//!
//! Environment variables take precedence over config file values. Only
//! the loaders read the environment; [`crate::Store::init`] uses the
//! `Config` it is given as is.
//!
//! Working out a platform-specific directory for an application is up to
//! the caller. There is no default directory: a `Config` without one is
//! rejected by the store with a configuration error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "PERSIST";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one JSON file per key
    #[serde(default)]
    pub directory: PathBuf,

    /// Read every existing record into the cache at startup
    #[serde(default = "default_preload")]
    pub preload: bool,

    /// Write records tab-indented instead of compact
    #[serde(default)]
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            preload: default_preload(),
            pretty: false,
        }
    }
}

impl Config {
    /// Configuration for a store in `directory`, with preload enabled
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // PERSIST_DIRECTORY
        if let Ok(val) = std::env::var(format!("{}_DIRECTORY", ENV_PREFIX)) {
            self.directory = PathBuf::from(val);
        }

        // PERSIST_PRELOAD
        if let Ok(val) = std::env::var(format!("{}_PRELOAD", ENV_PREFIX)) {
            self.preload = parse_flag(&val);
        }

        // PERSIST_PRETTY
        if let Ok(val) = std::env::var(format!("{}_PRETTY", ENV_PREFIX)) {
            self.pretty = parse_flag(&val);
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

fn default_preload() -> bool {
    true
}
