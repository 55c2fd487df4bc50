//! Organisation-scoped persistence
//!
//! Three independent stores back the catalog:
//! - [`SettingsStorage`]: plugin settings per organisation
//! - [`RepositoryStorage`]: repositories registered per organisation
//! - [`PluginStatesStorage`]: enabled-flag overrides per organisation
//!
//! Stores do no validation. Each one is consistent on its own; callers that
//! need a sequence across stores must coordinate themselves.

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{PluginState, Repository};

pub use file::JsonFileStorage;
pub use memory::{PluginStatesStorageMemory, RepositoryStorageMemory, SettingsStorageMemory};

/// Key-value settings scoped by organisation and plugin
pub trait SettingsStorage: Send + Sync {
    /// Insert a new setting, failing with `DuplicateKey` if it exists
    fn create(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()>;

    /// Insert or overwrite a setting
    fn update_by_key(&self, key: &str, value: &str, organisation_id: &str, plugin_id: &str) -> Result<()>;

    /// Remove a setting; absent keys are ignored
    fn delete(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<()>;

    /// All settings of a plugin, empty when none were stored
    fn get_all(&self, organisation_id: &str, plugin_id: &str) -> Result<BTreeMap<String, String>>;

    fn get_by_key(&self, key: &str, organisation_id: &str, plugin_id: &str) -> Result<String>;

    fn delete_all(&self, organisation_id: &str, plugin_id: &str) -> Result<()>;
}

/// Repositories registered for an organisation
pub trait RepositoryStorage: Send + Sync {
    fn create(&self, repository: &Repository, organisation_id: &str) -> Result<()>;

    fn get(&self, repository_id: &str, organisation_id: &str) -> Result<Repository>;

    /// All repositories of the organisation, sorted by id
    fn list(&self, organisation_id: &str) -> Result<Vec<Repository>>;

    fn delete(&self, repository_id: &str, organisation_id: &str) -> Result<()>;
}

/// Enabled-flag overrides keyed by plugin id
pub trait PluginStatesStorage: Send + Sync {
    /// `None` means no override was ever stored
    fn get(&self, plugin_id: &str, organisation_id: &str) -> Result<Option<PluginState>>;

    fn set_enabled(&self, plugin_id: &str, organisation_id: &str, enabled: bool) -> Result<()>;

    fn delete(&self, plugin_id: &str, organisation_id: &str) -> Result<()>;
}

