//! Plugin service
//!
//! Presents the per-organisation plugin catalog. Plugins come from the
//! repositories registered for the organisation plus the bundled `LOCAL`
//! repository; their `enabled` flag is overlaid from the plugin state store.
//!
//! A plugin can only be enabled while the organisation's settings satisfy
//! the plugin's schema. Removing a setting that the schema requires disables
//! the plugin again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::{PluginMap, PluginRepositoryClient};
use crate::error::{Error, Result};
use crate::local_repository::LocalPluginRepository;
use crate::models::{LOCAL_REPOSITORY_ID, Plugin, Repository};
use crate::schema::{self, SchemaViolation};
use crate::storage::{PluginStatesStorage, RepositoryStorage, SettingsStorage};

type PairKey = (String, String);
type PairLocks = Mutex<HashMap<PairKey, Arc<Mutex<()>>>>;

pub struct PluginService {
    plugin_states: Arc<dyn PluginStatesStorage>,
    repositories: Arc<dyn RepositoryStorage>,
    settings: Arc<dyn SettingsStorage>,
    client: Arc<dyn PluginRepositoryClient>,
    local_repository: Arc<LocalPluginRepository>,
    /// One lock per (organisation, plugin) pair guarding validate-then-write.
    /// Entries only live while a guard for the pair is held or awaited.
    pair_locks: PairLocks,
}

impl PluginService {
    pub fn new(
        plugin_states: Arc<dyn PluginStatesStorage>,
        repositories: Arc<dyn RepositoryStorage>,
        settings: Arc<dyn SettingsStorage>,
        client: Arc<dyn PluginRepositoryClient>,
        local_repository: Arc<LocalPluginRepository>,
    ) -> Self {
        Self {
            plugin_states,
            repositories,
            settings,
            client,
            local_repository,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Direct access to the settings store
    ///
    /// Writes through this handle are not validated and never change a
    /// plugin's enabled state.
    pub fn settings_storage(&self) -> &dyn SettingsStorage {
        self.settings.as_ref()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Every plugin visible to the organisation
    ///
    /// Registered repositories come first in id order, followed by the local
    /// repository. A plugin id present in several repositories is listed once
    /// per repository.
    pub fn get_all(&self, organisation_id: &str) -> Result<Vec<Plugin>> {
        let mut all = Vec::new();

        for repository in self.all_repositories(organisation_id)? {
            let mut plugins: Vec<Plugin> = self
                .client_for(&repository)
                .get_plugins(&repository)?
                .into_values()
                .collect();
            plugins.sort_by(|a, b| a.id().cmp(b.id()));

            for mut plugin in plugins {
                self.overlay_state(&mut plugin, organisation_id)?;
                all.push(plugin);
            }
        }

        debug!("Listed {} plugins for organisation '{}'", all.len(), organisation_id);
        Ok(all)
    }

    /// All plugins of one repository keyed by plugin id
    pub fn repository_plugins(&self, repository_id: &str, organisation_id: &str) -> Result<PluginMap> {
        let repository = self.resolve_repository(repository_id, organisation_id)?;
        let mut plugins = self.client_for(&repository).get_plugins(&repository)?;

        for plugin in plugins.values_mut() {
            self.overlay_state(plugin, organisation_id)?;
        }
        Ok(plugins)
    }

    /// A single plugin of one repository
    pub fn repository_plugin(&self, repository_id: &str, plugin_id: &str, organisation_id: &str) -> Result<Plugin> {
        let mut plugin = self.fetch_plugin(repository_id, plugin_id, organisation_id)?;
        self.overlay_state(&mut plugin, organisation_id)?;
        Ok(plugin)
    }

    /// Find a plugin by id alone
    ///
    /// The local repository is searched first, then the registered
    /// repositories in id order. The first match wins.
    pub fn by_plugin_id(&self, plugin_id: &str, organisation_id: &str) -> Result<Plugin> {
        if let Some(plugin) = self.local_repository.by_id(plugin_id) {
            let mut plugin = plugin.clone();
            self.overlay_state(&mut plugin, organisation_id)?;
            return Ok(plugin);
        }

        for repository in self.repositories.list(organisation_id)? {
            match self.client.get_plugin(&repository, plugin_id) {
                Ok(mut plugin) => {
                    self.overlay_state(&mut plugin, organisation_id)?;
                    return Ok(plugin);
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::NotFound(format!(
            "plugin '{}' for organisation '{}'",
            plugin_id, organisation_id
        )))
    }

    /// The settings schema a plugin declares, `None` if it has no settings
    pub fn schema(&self, plugin_id: &str) -> Option<Value> {
        self.local_repository.schema(plugin_id).cloned()
    }

    /// The long description shipped with a bundled plugin
    pub fn description(&self, plugin_id: &str) -> Option<String> {
        self.local_repository.description(plugin_id).map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Enablement
    // ------------------------------------------------------------------

    /// Enable or disable a plugin for an organisation
    ///
    /// Enabling a plugin that declares a schema requires the organisation's
    /// current settings to satisfy it; otherwise nothing is persisted and
    /// `SettingsNotConformingToSchema` is returned.
    pub fn update_by_id(
        &self,
        repository_id: &str,
        plugin_id: &str,
        organisation_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.fetch_plugin(repository_id, plugin_id, organisation_id)?;
        let _guard = self.lock_pair(organisation_id, plugin_id);

        if enabled {
            if let Some(schema) = self.local_repository.schema(plugin_id) {
                let settings = self.settings.get_all(organisation_id, plugin_id)?;
                check_settings(schema, &settings).map_err(|violation| Error::SettingsNotConformingToSchema {
                    organisation_id: organisation_id.to_string(),
                    plugin_id: plugin_id.to_string(),
                    detail: violation.message,
                })?;
            }
        }

        self.plugin_states.set_enabled(plugin_id, organisation_id, enabled)?;
        info!(
            "Plugin '{}' of repository '{}' {} for organisation '{}'",
            plugin_id,
            repository_id,
            if enabled { "enabled" } else { "disabled" },
            organisation_id
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn get_all_settings(&self, organisation_id: &str, plugin_id: &str) -> Result<BTreeMap<String, String>> {
        self.settings.get_all(organisation_id, plugin_id)
    }

    pub fn get_setting_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<String> {
        self.settings.get_by_key(key, organisation_id, plugin_id)
    }

    /// Write several settings at once; existing keys are overwritten
    pub fn upsert_settings(
        &self,
        values: &BTreeMap<String, String>,
        organisation_id: &str,
        plugin_id: &str,
    ) -> Result<()> {
        for (key, value) in values {
            self.settings.update_by_key(key, value, organisation_id, plugin_id)?;
        }
        Ok(())
    }

    /// Delete a setting, disabling the plugin if its schema no longer holds
    ///
    /// The disable is persisted before the setting is removed, so a reader
    /// never sees the plugin enabled without its required settings.
    pub fn delete_setting_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<()> {
        let _guard = self.lock_pair(organisation_id, plugin_id);

        let mut remaining = self.settings.get_all(organisation_id, plugin_id)?;
        remaining.remove(key);

        self.disable_if_nonconforming(&remaining, organisation_id, plugin_id)?;
        self.settings.delete(key, organisation_id, plugin_id)
    }

    /// Delete all of a plugin's settings, with the same cascade as
    /// [`delete_setting_by_key`](Self::delete_setting_by_key)
    pub fn clear_settings(&self, organisation_id: &str, plugin_id: &str) -> Result<()> {
        let _guard = self.lock_pair(organisation_id, plugin_id);

        self.disable_if_nonconforming(&BTreeMap::new(), organisation_id, plugin_id)?;
        self.settings.delete_all(organisation_id, plugin_id)
    }

    // ------------------------------------------------------------------
    // Repositories
    // ------------------------------------------------------------------

    /// Registered repositories of the organisation followed by the local one
    pub fn repositories(&self, organisation_id: &str) -> Result<Vec<Repository>> {
        self.all_repositories(organisation_id)
    }

    pub fn add_repository(&self, repository: &Repository, organisation_id: &str) -> Result<()> {
        if repository.is_local() {
            return Err(Error::ReservedRepository(repository.id.clone()));
        }

        self.repositories.create(repository, organisation_id)?;
        info!(
            "Registered repository '{}' ({}) for organisation '{}'",
            repository.id, repository.base_url, organisation_id
        );
        Ok(())
    }

    pub fn remove_repository(&self, repository_id: &str, organisation_id: &str) -> Result<()> {
        if repository_id == LOCAL_REPOSITORY_ID {
            return Err(Error::ReservedRepository(repository_id.to_string()));
        }

        self.repositories.delete(repository_id, organisation_id)?;
        info!("Removed repository '{}' for organisation '{}'", repository_id, organisation_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn all_repositories(&self, organisation_id: &str) -> Result<Vec<Repository>> {
        let mut repositories: Vec<Repository> = self
            .repositories
            .list(organisation_id)?
            .into_iter()
            .filter(|repository| !repository.is_local())
            .collect();
        repositories.sort_by(|a, b| a.id.cmp(&b.id));
        repositories.push(Repository::local());
        Ok(repositories)
    }

    fn resolve_repository(&self, repository_id: &str, organisation_id: &str) -> Result<Repository> {
        if repository_id == LOCAL_REPOSITORY_ID {
            return Ok(Repository::local());
        }
        self.repositories.get(repository_id, organisation_id)
    }

    fn client_for(&self, repository: &Repository) -> &dyn PluginRepositoryClient {
        if repository.is_local() {
            self.local_repository.as_ref()
        } else {
            self.client.as_ref()
        }
    }

    fn fetch_plugin(&self, repository_id: &str, plugin_id: &str, organisation_id: &str) -> Result<Plugin> {
        let repository = self.resolve_repository(repository_id, organisation_id)?;
        self.client_for(&repository).get_plugin(&repository, plugin_id)
    }

    fn overlay_state(&self, plugin: &mut Plugin, organisation_id: &str) -> Result<()> {
        if let Some(state) = self.plugin_states.get(plugin.id(), organisation_id)? {
            plugin.set_enabled(state.enabled);
        }
        Ok(())
    }

    /// Persist `enabled = false` when `settings` would not let the plugin be
    /// enabled. Callers must hold the pair lock.
    ///
    /// The state is keyed by plugin id only and the same id may be served by
    /// several repositories, so the disable is written even when no state is
    /// stored yet.
    fn disable_if_nonconforming(
        &self,
        settings: &BTreeMap<String, String>,
        organisation_id: &str,
        plugin_id: &str,
    ) -> Result<()> {
        let Some(schema) = self.local_repository.schema(plugin_id) else {
            return Ok(());
        };

        if let Err(violation) = check_settings(schema, settings) {
            let state = self.plugin_states.get(plugin_id, organisation_id)?;
            if state.is_none_or(|state| state.enabled) {
                warn!(
                    "Disabling plugin '{}' for organisation '{}': {}",
                    plugin_id, organisation_id, violation
                );
                self.plugin_states.set_enabled(plugin_id, organisation_id, false)?;
            }
        }
        Ok(())
    }

    fn lock_pair(&self, organisation_id: &str, plugin_id: &str) -> PairGuard<'_> {
        let key = (organisation_id.to_string(), plugin_id.to_string());
        let lock = self.pair_locks.lock().entry(key.clone()).or_default().clone();

        PairGuard {
            locks: &self.pair_locks,
            key,
            guard: Some(lock.lock_arc()),
        }
    }
}

/// Holds the lock of one (organisation, plugin) pair and removes the map
/// entry on release once nobody else uses it
struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: PairKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        // Release the pair lock (and its Arc) before inspecting the map
        self.guard.take();

        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

fn check_settings(schema: &Value, settings: &BTreeMap<String, String>) -> std::result::Result<(), SchemaViolation> {
    schema::validate(&schema::settings_instance(settings), schema)
}
