//! Configuration management for Katalogus
//!
//! Handles loading, saving, and defaulting the service configuration:
//! where the bundled plugins live, where state is stored, and how remote
//! repositories are reached.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub local_repository: LocalRepositoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when no filter is given in the environment
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Location of the bundled plugin packages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRepositoryConfig {
    pub path: PathBuf,
}

impl Default for LocalRepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("boefjes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// State is lost when the process exits
    Memory,
    /// State is kept in a JSON file
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// State file for the `file` backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
        }
    }
}

impl StorageConfig {
    /// The state file to use, falling back to the data directory
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|p| p.join("katalogus"))
                .unwrap_or_else(|| PathBuf::from(".katalogus"))
                .join("state.json")
        })
    }
}

/// Remote repository access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// HTTP request timeout (seconds)
    pub timeout_secs: u64,
    /// Serve remote repositories from this JSON seed instead of HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            seed_file: None,
        }
    }
}

impl Config {
    /// Set a single value addressed by its dotted key, e.g. `storage.backend`
    ///
    /// An empty value clears the optional paths.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional_path = |value: &str| (!value.is_empty()).then(|| PathBuf::from(value));

        match key {
            "general.log_level" => self.general.log_level = value.to_string(),
            "local_repository.path" => self.local_repository.path = PathBuf::from(value),
            "storage.backend" => {
                self.storage.backend = match value {
                    "memory" => StorageBackend::Memory,
                    "file" => StorageBackend::File,
                    other => {
                        return Err(Error::Config(format!(
                            "Unknown storage backend '{}', expected 'memory' or 'file'",
                            other
                        )));
                    }
                }
            }
            "storage.path" => self.storage.path = optional_path(value),
            "remote.timeout_secs" => {
                self.remote.timeout_secs = value
                    .parse()
                    .map_err(|e| Error::Config(format!("Invalid timeout '{}': {}", value, e)))?
            }
            "remote.seed_file" => self.remote.seed_file = optional_path(value),
            _ => return Err(Error::Config(format!("Unknown configuration key '{}'", key))),
        }
        Ok(())
    }
}

/// The user-level config file, `<config dir>/katalogus/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("katalogus").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not find config directory".to_string()))
}

/// A configuration together with the file it is read from and saved to
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Read the configuration at `path`, or at [`default_config_path`]
    ///
    /// A missing file yields the defaults; it is only created by [`save`](Self::save).
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };

        let config = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(Error::Config(format!("Failed to read {}: {}", path.display(), e))),
        };

        Ok(Self { path, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file exists yet
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Change one value in memory; see [`Config::set`]
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.config.set(key, value)
    }

    /// Write the configuration to its file, creating parent directories
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Config(format!("Failed to write {}: {}", self.path.display(), e)))
    }
}
