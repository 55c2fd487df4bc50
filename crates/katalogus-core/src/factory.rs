//! Wiring a [`PluginService`] from configuration

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clients::{HttpPluginRepositoryClient, InMemoryPluginRepositoryClient, PluginRepositoryClient};
use crate::config::{Config, StorageBackend};
use crate::error::Result;
use crate::local_repository::LocalPluginRepository;
use crate::service::PluginService;
use crate::storage::{
    JsonFileStorage, PluginStatesStorageMemory, RepositoryStorageMemory, SettingsStorageMemory,
};

/// Build the service described by `config`
pub fn create_plugin_service(config: &Config) -> Result<PluginService> {
    let local_repository = Arc::new(LocalPluginRepository::new(&config.local_repository.path)?);

    let client: Arc<dyn PluginRepositoryClient> = match &config.remote.seed_file {
        Some(seed) => {
            info!("Serving remote repositories from seed {}", seed.display());
            Arc::new(InMemoryPluginRepositoryClient::load(seed)?)
        }
        None => Arc::new(HttpPluginRepositoryClient::new(Duration::from_secs(
            config.remote.timeout_secs,
        ))?),
    };

    let service = match config.storage.backend {
        StorageBackend::Memory => PluginService::new(
            Arc::new(PluginStatesStorageMemory::new()),
            Arc::new(RepositoryStorageMemory::new()),
            Arc::new(SettingsStorageMemory::new()),
            client,
            local_repository,
        ),
        StorageBackend::File => {
            let store = Arc::new(JsonFileStorage::open(config.storage.resolved_path())?);
            PluginService::new(store.clone(), store.clone(), store, client, local_repository)
        }
    };

    Ok(service)
}
