//! In-memory stores
//!
//! The table types here hold the actual bookkeeping and are shared with
//! [`JsonFileStorage`](super::JsonFileStorage), which persists them to disk.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{PluginStatesStorage, RepositoryStorage, SettingsStorage};
use crate::error::{Error, Result};
use crate::models::{PluginState, Repository};

/// organisation -> plugin -> key -> value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct SettingsTable(BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>);

impl SettingsTable {
    pub(crate) fn create(&mut self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        let settings = self.scope_mut(organisation_id, plugin_id);
        if settings.contains_key(key) {
            return Err(Error::DuplicateKey(format!(
                "setting '{}' for organisation '{}' and plugin '{}'",
                key, organisation_id, plugin_id
            )));
        }
        settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub(crate) fn update_by_key(&mut self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) {
        self.scope_mut(organisation_id, plugin_id)
            .insert(key.to_string(), value.to_string());
    }

    pub(crate) fn delete(&mut self, key: &str, organisation_id: &str, plugin_id: &str) {
        let Some(plugins) = self.0.get_mut(organisation_id) else {
            return;
        };
        let Some(settings) = plugins.get_mut(plugin_id) else {
            return;
        };

        settings.remove(key);
        if settings.is_empty() {
            plugins.remove(plugin_id);
        }
    }

    pub(crate) fn delete_all(&mut self, organisation_id: &str, plugin_id: &str) {
        if let Some(plugins) = self.0.get_mut(organisation_id) {
            plugins.remove(plugin_id);
        }
    }

    pub(crate) fn get_all(&self, organisation_id: &str, plugin_id: &str) -> BTreeMap<String, String> {
        self.0
            .get(organisation_id)
            .and_then(|plugins| plugins.get(plugin_id))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn get_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<String> {
        self.0
            .get(organisation_id)
            .and_then(|plugins| plugins.get(plugin_id))
            .and_then(|settings| settings.get(key))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "setting '{}' for organisation '{}' and plugin '{}'",
                    key, organisation_id, plugin_id
                ))
            })
    }

    fn scope_mut(&mut self, organisation_id: &str, plugin_id: &str) -> &mut BTreeMap<String, String> {
        self.0
            .entry(organisation_id.to_string())
            .or_default()
            .entry(plugin_id.to_string())
            .or_default()
    }
}

/// organisation -> repository id -> repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct RepositoryTable(BTreeMap<String, BTreeMap<String, Repository>>);

impl RepositoryTable {
    pub(crate) fn create(&mut self, repository: &Repository, organisation_id: &str) -> Result<()> {
        let repositories = self.0.entry(organisation_id.to_string()).or_default();
        if repositories.contains_key(&repository.id) {
            return Err(Error::DuplicateKey(format!(
                "repository '{}' for organisation '{}'",
                repository.id, organisation_id
            )));
        }
        repositories.insert(repository.id.clone(), repository.clone());
        Ok(())
    }

    pub(crate) fn get(&self, repository_id: &str, organisation_id: &str) -> Result<Repository> {
        self.0
            .get(organisation_id)
            .and_then(|repositories| repositories.get(repository_id))
            .cloned()
            .ok_or_else(|| Error::repository_not_found(repository_id, organisation_id))
    }

    pub(crate) fn list(&self, organisation_id: &str) -> Vec<Repository> {
        self.0
            .get(organisation_id)
            .map(|repositories| repositories.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn delete(&mut self, repository_id: &str, organisation_id: &str) -> Result<()> {
        self.0
            .get_mut(organisation_id)
            .and_then(|repositories| repositories.remove(repository_id))
            .map(|_| ())
            .ok_or_else(|| Error::repository_not_found(repository_id, organisation_id))
    }
}

/// organisation -> plugin id -> state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct PluginStateTable(BTreeMap<String, BTreeMap<String, PluginState>>);

impl PluginStateTable {
    pub(crate) fn get(&self, plugin_id: &str, organisation_id: &str) -> Option<PluginState> {
        self.0
            .get(organisation_id)
            .and_then(|states| states.get(plugin_id))
            .copied()
    }

    pub(crate) fn set_enabled(&mut self, plugin_id: &str, organisation_id: &str, enabled: bool) {
        self.0
            .entry(organisation_id.to_string())
            .or_default()
            .insert(plugin_id.to_string(), PluginState { enabled });
    }

    pub(crate) fn delete(&mut self, plugin_id: &str, organisation_id: &str) {
        if let Some(states) = self.0.get_mut(organisation_id) {
            states.remove(plugin_id);
        }
    }
}

/// Settings kept in process memory
#[derive(Debug, Default)]
pub struct SettingsStorageMemory {
    table: RwLock<SettingsTable>,
}

impl SettingsStorageMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for SettingsStorageMemory {
    fn create(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.table.write().create(key, value, organisation_id, plugin_id)
    }

    fn update_by_key(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.table.write().update_by_key(key, value, organisation_id, plugin_id);
        Ok(())
    }

    fn delete(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.table.write().delete(key, organisation_id, plugin_id);
        Ok(())
    }

    fn get_all(&self, organisation_id: &str, plugin_id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.table.read().get_all(organisation_id, plugin_id))
    }

    fn get_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<String> {
        self.table.read().get_by_key(key, organisation_id, plugin_id)
    }

    fn delete_all(&self, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.table.write().delete_all(organisation_id, plugin_id);
        Ok(())
    }
}

/// Repository registrations kept in process memory
#[derive(Debug, Default)]
pub struct RepositoryStorageMemory {
    table: RwLock<RepositoryTable>,
}

impl RepositoryStorageMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RepositoryStorage for RepositoryStorageMemory {
    fn create(&self, repository: &Repository, organisation_id: &str) -> Result<()> {
        self.table.write().create(repository, organisation_id)
    }

    fn get(&self, repository_id: &str, organisation_id: &str) -> Result<Repository> {
        self.table.read().get(repository_id, organisation_id)
    }

    fn list(&self, organisation_id: &str) -> Result<Vec<Repository>> {
        Ok(self.table.read().list(organisation_id))
    }

    fn delete(&self, repository_id: &str, organisation_id: &str) -> Result<()> {
        self.table.write().delete(repository_id, organisation_id)
    }
}

/// Plugin states kept in process memory
#[derive(Debug, Default)]
pub struct PluginStatesStorageMemory {
    table: RwLock<PluginStateTable>,
}

impl PluginStatesStorageMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginStatesStorage for PluginStatesStorageMemory {
    fn get(&self, plugin_id: &str, organisation_id: &str) -> Result<Option<PluginState>> {
        Ok(self.table.read().get(plugin_id, organisation_id))
    }

    fn set_enabled(&self, plugin_id: &str, organisation_id: &str, enabled: bool) -> Result<()> {
        self.table.write().set_enabled(plugin_id, organisation_id, enabled);
        Ok(())
    }

    fn delete(&self, plugin_id: &str, organisation_id: &str) -> Result<()> {
        self.table.write().delete(plugin_id, organisation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod settings_tests {
        use super::*;

        #[test]
        fn test_create_and_get_all() {
            let storage = SettingsStorageMemory::new();
            storage.create("DUMMY_VAR", "123", "test", "test_plugin").unwrap();

            let settings = storage.get_all("test", "test_plugin").unwrap();
            assert_eq!(settings.get("DUMMY_VAR").map(String::as_str), Some("123"));
        }

        #[test]
        fn test_create_duplicate_key() {
            let storage = SettingsStorageMemory::new();
            storage.create("DUMMY_VAR", "123", "test", "test_plugin").unwrap();

            let result = storage.create("DUMMY_VAR", "456", "test", "test_plugin");
            assert!(matches!(result, Err(Error::DuplicateKey(_))));
            assert_eq!(storage.get_by_key("DUMMY_VAR", "test", "test_plugin").unwrap(), "123");
        }

        #[test]
        fn test_update_by_key_upserts() {
            let storage = SettingsStorageMemory::new();
            storage.update_by_key("api_key", "one", "org", "plugin").unwrap();
            storage.update_by_key("api_key", "two", "org", "plugin").unwrap();

            assert_eq!(storage.get_by_key("api_key", "org", "plugin").unwrap(), "two");
        }

        #[test]
        fn test_delete_missing_is_noop() {
            let storage = SettingsStorageMemory::new();
            storage.delete("nothing", "org", "plugin").unwrap();
            assert!(storage.get_all("org", "plugin").unwrap().is_empty());
        }

        #[test]
        fn test_scoped_by_organisation_and_plugin() {
            let storage = SettingsStorageMemory::new();
            storage.create("key", "a", "org1", "plugin").unwrap();
            storage.create("key", "b", "org2", "plugin").unwrap();
            storage.create("key", "c", "org1", "other").unwrap();

            assert_eq!(storage.get_by_key("key", "org1", "plugin").unwrap(), "a");
            assert_eq!(storage.get_by_key("key", "org2", "plugin").unwrap(), "b");

            storage.delete_all("org1", "plugin").unwrap();
            assert!(storage.get_all("org1", "plugin").unwrap().is_empty());
            assert_eq!(storage.get_by_key("key", "org1", "other").unwrap(), "c");
        }

        #[test]
        fn test_get_by_key_not_found() {
            let storage = SettingsStorageMemory::new();
            let result = storage.get_by_key("missing", "org", "plugin");
            assert!(matches!(result, Err(Error::NotFound(_))));
        }
    }

    mod repository_tests {
        use super::*;

        #[test]
        fn test_create_get_list() {
            let storage = RepositoryStorageMemory::new();
            storage
                .create(&Repository::new("test-repo-2", "Test2", "http://localhost:8081"), "test")
                .unwrap();
            storage
                .create(&Repository::new("test-repo", "Test", "http://localhost:8080"), "test")
                .unwrap();

            let repository = storage.get("test-repo", "test").unwrap();
            assert_eq!(repository.base_url, "http://localhost:8080");

            let ids: Vec<_> = storage.list("test").unwrap().into_iter().map(|r| r.id).collect();
            assert_eq!(ids, vec!["test-repo", "test-repo-2"]);
            assert!(storage.list("other").unwrap().is_empty());
        }

        #[test]
        fn test_get_unknown_repository() {
            let storage = RepositoryStorageMemory::new();
            assert!(matches!(storage.get("nope", "test"), Err(Error::NotFound(_))));
        }

        #[test]
        fn test_duplicate_and_delete() {
            let storage = RepositoryStorageMemory::new();
            let repository = Repository::new("r", "R", "http://r");
            storage.create(&repository, "org").unwrap();

            assert!(matches!(storage.create(&repository, "org"), Err(Error::DuplicateKey(_))));
            // Same id in another organisation is independent
            storage.create(&repository, "org2").unwrap();

            storage.delete("r", "org").unwrap();
            assert!(storage.get("r", "org").is_err());
            assert!(storage.get("r", "org2").is_ok());
            assert!(matches!(storage.delete("r", "org"), Err(Error::NotFound(_))));
        }
    }

    mod plugin_state_tests {
        use super::*;

        #[test]
        fn test_absent_state_is_none() {
            let storage = PluginStatesStorageMemory::new();
            assert_eq!(storage.get("plugin", "org").unwrap(), None);
        }

        #[test]
        fn test_set_and_delete() {
            let storage = PluginStatesStorageMemory::new();
            storage.set_enabled("plugin", "org", true).unwrap();
            assert_eq!(storage.get("plugin", "org").unwrap(), Some(PluginState { enabled: true }));
            assert_eq!(storage.get("plugin", "other").unwrap(), None);

            storage.set_enabled("plugin", "org", false).unwrap();
            assert_eq!(storage.get("plugin", "org").unwrap(), Some(PluginState { enabled: false }));

            storage.delete("plugin", "org").unwrap();
            assert_eq!(storage.get("plugin", "org").unwrap(), None);
            storage.delete("plugin", "org").unwrap();
        }
    }
}
