//! Client over a fixed set of repositories held in memory
//!
//! Used for seed data: the contents are supplied at construction, either in
//! code or from a JSON seed file shaped as
//! `{"<repository id>": [<plugin>, ...], ...}`.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use super::{PluginMap, PluginRepositoryClient};
use crate::error::{Error, Result};
use crate::models::{Plugin, Repository};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPluginRepositoryClient {
    repositories: HashMap<String, PluginMap>,
}

impl InMemoryPluginRepositoryClient {
    pub fn new(repositories: HashMap<String, PluginMap>) -> Self {
        Self { repositories }
    }

    /// Build a client from plugin lists, attributing each plugin to the
    /// repository it is listed under
    pub fn from_lists(repositories: HashMap<String, Vec<Plugin>>) -> Self {
        let repositories = repositories
            .into_iter()
            .map(|(repository_id, plugins)| {
                let plugins = plugins
                    .into_iter()
                    .map(|mut plugin| {
                        plugin.set_repository_id(&repository_id);
                        (plugin.id().to_string(), plugin)
                    })
                    .collect();
                (repository_id, plugins)
            })
            .collect();

        Self { repositories }
    }

    /// Load a seed file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let lists: HashMap<String, Vec<Plugin>> = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidDefinition(path.to_path_buf(), e.to_string()))?;

        debug!("Loaded seed for {} repositories from {}", lists.len(), path.display());
        Ok(Self::from_lists(lists))
    }
}

impl PluginRepositoryClient for InMemoryPluginRepositoryClient {
    fn get_plugins(&self, repository: &Repository) -> Result<PluginMap> {
        // An unknown repository simply has no plugins yet
        Ok(self
            .repositories
            .get(&repository.id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_plugin(&self, repository: &Repository, plugin_id: &str) -> Result<Plugin> {
        self.repositories
            .get(&repository.id)
            .and_then(|plugins| plugins.get(plugin_id))
            .cloned()
            .ok_or_else(|| Error::plugin_not_found(&repository.id, plugin_id))
    }
}
