//! JSON file backed stores
//!
//! All three stores live in one JSON document. Every mutation is applied to a
//! copy, written to `<path>.tmp` and renamed over the original; the in-memory
//! state only changes once the write succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::memory::{PluginStateTable, RepositoryTable, SettingsTable};
use super::{PluginStatesStorage, RepositoryStorage, SettingsStorage};
use crate::error::{Error, Result};
use crate::models::{PluginState, Repository};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    settings: SettingsTable,
    #[serde(default)]
    repositories: RepositoryTable,
    #[serde(default)]
    plugin_states: PluginStateTable,
}

/// Settings, repositories and plugin states persisted to a single file
pub struct JsonFileStorage {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl JsonFileStorage {
    /// Open the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Storage(format!("Failed to parse {}: {}", path.display(), e)))?
        } else {
            Snapshot::default()
        };

        debug!("Opened state store at {}", path.display());
        Ok(Self {
            path,
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Get the path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the state and persist it
    fn mutate<T>(&self, change: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut snapshot = self.snapshot.write();
        let mut next = snapshot.clone();
        let output = change(&mut next)?;
        self.persist(&next)?;
        *snapshot = next;
        Ok(output)
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, content)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl SettingsStorage for JsonFileStorage {
    fn create(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.mutate(|s| s.settings.create(key, value, organisation_id, plugin_id))
    }

    fn update_by_key(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.mutate(|s| {
            s.settings.update_by_key(key, value, organisation_id, plugin_id);
            Ok(())
        })
    }

    fn delete(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        if self.snapshot.read().settings.get_by_key(key, organisation_id, plugin_id).is_err() {
            return Ok(());
        }
        self.mutate(|s| {
            s.settings.delete(key, organisation_id, plugin_id);
            Ok(())
        })
    }

    fn get_all(&self, organisation_id: &str, plugin_id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.snapshot.read().settings.get_all(organisation_id, plugin_id))
    }

    fn get_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<String> {
        self.snapshot.read().settings.get_by_key(key, organisation_id, plugin_id)
    }

    fn delete_all(&self, organisation_id: &str, plugin_id: &str) -> Result<()> {
        self.mutate(|s| {
            s.settings.delete_all(organisation_id, plugin_id);
            Ok(())
        })
    }
}

impl RepositoryStorage for JsonFileStorage {
    fn create(&self, repository: &Repository, organisation_id: &str) -> Result<()> {
        self.mutate(|s| s.repositories.create(repository, organisation_id))
    }

    fn get(&self, repository_id: &str, organisation_id: &str) -> Result<Repository> {
        self.snapshot.read().repositories.get(repository_id, organisation_id)
    }

    fn list(&self, organisation_id: &str) -> Result<Vec<Repository>> {
        Ok(self.snapshot.read().repositories.list(organisation_id))
    }

    fn delete(&self, repository_id: &str, organisation_id: &str) -> Result<()> {
        self.mutate(|s| s.repositories.delete(repository_id, organisation_id))
    }
}

impl PluginStatesStorage for JsonFileStorage {
    fn get(&self, plugin_id: &str, organisation_id: &str) -> Result<Option<PluginState>> {
        Ok(self.snapshot.read().plugin_states.get(plugin_id, organisation_id))
    }

    fn set_enabled(&self, plugin_id: &str, organisation_id: &str, enabled: bool) -> Result<()> {
        if self.snapshot.read().plugin_states.get(plugin_id, organisation_id) == Some(PluginState { enabled }) {
            return Ok(());
        }
        self.mutate(|s| {
            s.plugin_states.set_enabled(plugin_id, organisation_id, enabled);
            Ok(())
        })
    }

    fn delete(&self, plugin_id: &str, organisation_id: &str) -> Result<()> {
        self.mutate(|s| {
            s.plugin_states.delete(plugin_id, organisation_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStorage::open(temp.path().join("state.json")).unwrap();

        assert!(SettingsStorage::get_all(&store, "org", "plugin").unwrap().is_empty());
        assert!(RepositoryStorage::list(&store, "org").unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.json");

        {
            let store = JsonFileStorage::open(&path).unwrap();
            SettingsStorage::create(&store, "api_key", "secret", "org", "kat_test").unwrap();
            RepositoryStorage::create(&store, &Repository::new("r", "R", "http://r"), "org").unwrap();
            PluginStatesStorage::set_enabled(&store, "kat_test", "org", true).unwrap();
        }

        let store = JsonFileStorage::open(&path).unwrap();
        assert_eq!(SettingsStorage::get_by_key(&store, "api_key", "org", "kat_test").unwrap(), "secret");
        assert_eq!(RepositoryStorage::get(&store, "r", "org").unwrap().base_url, "http://r");
        assert_eq!(
            PluginStatesStorage::get(&store, "kat_test", "org").unwrap(),
            Some(PluginState { enabled: true })
        );
    }

    #[test]
    fn test_failed_mutation_leaves_state_untouched() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStorage::open(temp.path().join("state.json")).unwrap();
        SettingsStorage::create(&store, "key", "value", "org", "plugin").unwrap();

        let result = SettingsStorage::create(&store, "key", "other", "org", "plugin");
        assert!(matches!(result, Err(Error::DuplicateKey(_))));

        let reopened = JsonFileStorage::open(store.path()).unwrap();
        assert_eq!(SettingsStorage::get_by_key(&reopened, "key", "org", "plugin").unwrap(), "value");
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let result = JsonFileStorage::open(&path);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_unwritable_location_is_storage_error() {
        let temp = TempDir::new().unwrap();
        // A regular file where the parent directory should be
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let store = JsonFileStorage::open(blocker.join("state.json")).unwrap();
        let result = PluginStatesStorage::set_enabled(&store, "p", "org", true);
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(PluginStatesStorage::get(&store, "p", "org").unwrap(), None);
    }
}
