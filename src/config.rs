//! Configuration for the cache layer.
//!
//! Settings may be specified in a TOML configuration file; every field has
//! a usable default so an empty file (or none at all) works out of the box.

use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

fn runtime_dir() -> Option<PathBuf> {
    if let Some(path) = dirs::runtime_dir() {
        return Some(path.join("cascache"));
    }
    if let Some(path) = dirs::home_dir() {
        return Some(path.join(".local").join("share").join("cascache"));
    }
    None
}

fn default_cache_path() -> PathBuf {
    runtime_dir().map_or_else(|| PathBuf::from("/tmp/cascache/objects"), |rd| rd.join("objects"))
}

fn default_socket_path() -> PathBuf {
    runtime_dir().map_or_else(|| PathBuf::from("/tmp/cascache/ctrl.sock"), |rd| rd.join("ctrl.sock"))
}

fn default_quota() -> ByteSize {
    ByteSize::gib(4)
}

fn default_meta_entries() -> usize {
    16_384
}

/// Object store and quota settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Root directory of the on-disk object store.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Quota high-water mark: eviction starts above this.
    #[serde(default = "default_quota")]
    pub quota: ByteSize,

    /// Quota low-water mark: eviction sweeps down to this. Defaults to
    /// three quarters of `quota`.
    pub low_water: Option<ByteSize>,

    /// Capacity of the in-memory path metadata cache, in entries.
    #[serde(default = "default_meta_entries")]
    pub meta_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            quota: default_quota(),
            low_water: None,
            meta_entries: default_meta_entries(),
        }
    }
}

impl CacheConfig {
    /// High-water mark in bytes.
    #[must_use]
    pub fn high_water_bytes(&self) -> u64 {
        self.quota.as_u64()
    }

    /// Low-water mark in bytes, derived when not set explicitly.
    #[must_use]
    pub fn low_water_bytes(&self) -> u64 {
        self.low_water
            .map_or_else(|| self.quota.as_u64() / 4 * 3, |b| b.as_u64())
    }
}

/// Control channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControlConfig {
    /// Unix socket path of the administrative control channel.
    #[serde(default = "default_socket_path")]
    pub socket: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
        }
    }
}

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config parent directory does not exist")]
    NoParentDir,

    #[error("no suitable configuration path found")]
    NoSuitableConfigPath,
}

impl Config {
    /// Validate the correctness of the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.cache.low_water_bytes() > self.cache.high_water_bytes() {
            errors.push(format!(
                "low-water mark ({}) exceeds quota ({}).",
                self.cache.low_water_bytes(),
                self.cache.high_water_bytes()
            ));
        }

        if self.cache.meta_entries == 0 {
            errors.push("meta-entries must be non-zero.".to_owned());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Returns config file paths in descending priority order.
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("cascache").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("cascache").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/cascache/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "loading configuration file");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, or the external
    /// path if given.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads config or creates a default one if none exists.
    /// Errors if a config file exists but is malformed or invalid.
    pub fn load_or_create(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(res) = Self::load(external_config_path) {
            let config = res?;
            if let Err(validation_errors) = config.validate() {
                return Err(ConfigError::ValidationErrors(validation_errors));
            }
            debug!("loaded configuration successfully");
            return Ok(config);
        }

        let creation_path = Self::config_search_paths()
            .into_iter()
            .next()
            .ok_or(ConfigError::NoSuitableConfigPath)?;

        let config = Self::default();
        config.write_to_disk(&creation_path)?;
        info!(path = %creation_path.display(), "created configuration file");
        Ok(config)
    }

    fn write_to_disk(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::create_dir_all(path.parent().ok_or(ConfigError::NoParentDir)?)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
