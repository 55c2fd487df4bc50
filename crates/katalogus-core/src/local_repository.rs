//! The bundled plugin repository
//!
//! Bundled plugins live on disk below a base directory, one directory per
//! plugin package:
//!
//! ```text
//! boefjes/
//!   kat_test/
//!     boefje.json       # boefje definition
//!     normalizer.json   # normalizer shipped with the boefje (optional)
//!     schema.json       # settings schema of the boefje (optional)
//!     description.md    # long description of the boefje (optional)
//! ```
//!
//! The directory is read once at construction; the repository never changes
//! afterwards. Every plugin it holds is attributed to [`LOCAL_REPOSITORY_ID`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::{PluginMap, PluginRepositoryClient};
use crate::error::{Error, Result};
use crate::models::{Boefje, LOCAL_REPOSITORY_ID, Normalizer, Plugin, PluginBase, Repository};

pub const BOEFJE_DEFINITION_FILE: &str = "boefje.json";
pub const NORMALIZER_DEFINITION_FILE: &str = "normalizer.json";
pub const SCHEMA_FILE: &str = "schema.json";
pub const DESCRIPTION_FILE: &str = "description.md";

/// Boefje definition as written in `boefje.json`
#[derive(Debug, Clone, Deserialize)]
pub struct BoefjeDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub related: Option<Vec<String>>,
    #[serde(default)]
    pub environment_keys: Vec<String>,
    #[serde(default = "default_scan_level")]
    pub scan_level: u8,
    #[serde(default)]
    pub consumes: BTreeSet<String>,
    #[serde(default)]
    pub produces: BTreeSet<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub enabled: bool,
}

fn default_scan_level() -> u8 {
    1
}

impl BoefjeDefinition {
    fn into_plugin(self) -> Plugin {
        let mut base = PluginBase::new(self.id, LOCAL_REPOSITORY_ID, self.name);
        base.version = self.version;
        base.description = self.description;
        base.authors = self.authors;
        base.created = self.created;
        base.related = self.related;
        base.environment_keys = self.environment_keys;
        base.enabled = self.enabled;

        Plugin::Boefje(Boefje {
            base,
            scan_level: self.scan_level,
            consumes: self.consumes,
            produces: self.produces,
            options: self.options,
        })
    }
}

/// Normalizer definition as written in `normalizer.json`
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerDefinition {
    pub id: String,
    /// Falls back to the id
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub environment_keys: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl NormalizerDefinition {
    fn into_plugin(self) -> Plugin {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        let mut base = PluginBase::new(self.id, LOCAL_REPOSITORY_ID, name);
        base.version = self.version;
        base.description = self.description;
        base.environment_keys = self.environment_keys;
        base.enabled = self.enabled;

        Plugin::Normalizer(Normalizer {
            base,
            consumes: self.consumes,
            produces: self.produces,
        })
    }
}

/// Plugins bundled on disk, served as the `LOCAL` repository
#[derive(Debug, Default)]
pub struct LocalPluginRepository {
    plugins: HashMap<String, Plugin>,
    schemas: HashMap<String, Value>,
    descriptions: HashMap<String, String>,
}

impl LocalPluginRepository {
    /// Load every plugin package below `base_dir`
    ///
    /// Packages with a malformed definition are skipped with a warning. A
    /// base directory that cannot be read is an error.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut repository = Self::default();

        let mut package_dirs: Vec<PathBuf> = std::fs::read_dir(&base_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        package_dirs.sort();

        for dir in package_dirs {
            if let Err(e) = repository.load_package(&dir) {
                warn!("Skipping plugin package {}: {}", dir.display(), e);
            }
        }

        debug!(
            "Loaded {} local plugins from {}",
            repository.plugins.len(),
            base_dir.display()
        );
        Ok(repository)
    }

    fn load_package(&mut self, dir: &Path) -> Result<()> {
        let boefje_path = dir.join(BOEFJE_DEFINITION_FILE);
        if boefje_path.exists() {
            let definition: BoefjeDefinition = read_json(&boefje_path)?;
            let schema_path = dir.join(SCHEMA_FILE);
            let schema = if schema_path.exists() {
                Some(read_json::<Value>(&schema_path)?)
            } else {
                None
            };
            let description = std::fs::read_to_string(dir.join(DESCRIPTION_FILE)).ok();

            let id = definition.id.clone();
            if self.insert(definition.into_plugin(), dir) {
                if let Some(schema) = schema {
                    self.schemas.insert(id.clone(), schema);
                }
                if let Some(description) = description {
                    self.descriptions.insert(id, description);
                }
            }
        }

        let normalizer_path = dir.join(NORMALIZER_DEFINITION_FILE);
        if normalizer_path.exists() {
            let definition: NormalizerDefinition = read_json(&normalizer_path)?;
            self.insert(definition.into_plugin(), dir);
        }

        Ok(())
    }

    /// Returns false when the id was already taken
    fn insert(&mut self, plugin: Plugin, dir: &Path) -> bool {
        let id = plugin.id().to_string();
        if self.plugins.contains_key(&id) {
            warn!(
                "Plugin '{}' in {} conflicts with an already loaded plugin, skipping",
                id,
                dir.display()
            );
            return false;
        }

        debug!("Loaded local {} '{}' from {}", plugin.plugin_type(), id, dir.display());
        self.plugins.insert(id, plugin);
        true
    }

    pub fn plugins(&self) -> &HashMap<String, Plugin> {
        &self.plugins
    }

    /// Look up a bundled plugin by id
    pub fn by_id(&self, plugin_id: &str) -> Option<&Plugin> {
        self.plugins.get(plugin_id)
    }

    /// Settings schema declared by a bundled plugin
    pub fn schema(&self, plugin_id: &str) -> Option<&Value> {
        self.schemas.get(plugin_id)
    }

    /// Long description shipped with a bundled plugin
    pub fn description(&self, plugin_id: &str) -> Option<&str> {
        self.descriptions.get(plugin_id).map(|s| s.as_str())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidDefinition(path.to_path_buf(), e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| Error::InvalidDefinition(path.to_path_buf(), e.to_string()))
}

impl PluginRepositoryClient for LocalPluginRepository {
    fn get_plugins(&self, repository: &Repository) -> Result<PluginMap> {
        if !repository.is_local() {
            return Ok(PluginMap::new());
        }
        Ok(self.plugins.clone())
    }

    fn get_plugin(&self, repository: &Repository, plugin_id: &str) -> Result<Plugin> {
        self.plugins
            .get(plugin_id)
            .filter(|_| repository.is_local())
            .cloned()
            .ok_or_else(|| Error::plugin_not_found(&repository.id, plugin_id))
    }
}
