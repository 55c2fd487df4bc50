//! Katalogus Core - per-organisation plugin catalog
//!
//! This crate provides the core functionality for the Katalogus service:
//! - Plugin data model (boefjes, normalizers, bits)
//! - Repository clients for remote, seeded and bundled plugins
//! - Organisation-scoped stores for settings, repositories and plugin states
//! - Settings schema validation gating plugin enablement
//! - The plugin service tying it all together

pub mod clients;
pub mod config;
pub mod error;
pub mod factory;
pub mod local_repository;
pub mod models;
pub mod schema;
pub mod service;
pub mod storage;

pub use clients::{HttpPluginRepositoryClient, InMemoryPluginRepositoryClient, PluginMap, PluginRepositoryClient};
pub use config::{Config, ConfigManager, StorageBackend};
pub use error::{Error, Result};
pub use factory::create_plugin_service;
pub use local_repository::LocalPluginRepository;
pub use models::{Bit, Boefje, LOCAL_REPOSITORY_ID, Normalizer, Plugin, PluginBase, PluginState, PluginType, Repository};
pub use schema::SchemaViolation;
pub use service::PluginService;
pub use storage::{
    JsonFileStorage, PluginStatesStorage, PluginStatesStorageMemory, RepositoryStorage, RepositoryStorageMemory,
    SettingsStorage, SettingsStorageMemory,
};
