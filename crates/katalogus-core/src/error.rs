//! Error types for Katalogus Core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Katalogus Error
pub type Result<T> = std::result::Result<T, Error>;

/// Katalogus error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error(
        "Settings for organisation {organisation_id} and plugin {plugin_id} are not conform the plugin schema: {detail}"
    )]
    SettingsNotConformingToSchema {
        organisation_id: String,
        plugin_id: String,
        detail: String,
    },

    #[error("Repository '{0}' is reserved for the bundled plugins")]
    ReservedRepository(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Repository client error: {0}")]
    Client(String),

    #[error("Invalid plugin definition in {0}: {1}")]
    InvalidDefinition(PathBuf, String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn plugin_not_found(repository_id: &str, plugin_id: &str) -> Self {
        Error::NotFound(format!(
            "plugin '{}' in repository '{}'",
            plugin_id, repository_id
        ))
    }

    pub(crate) fn repository_not_found(repository_id: &str, organisation_id: &str) -> Self {
        Error::NotFound(format!(
            "repository '{}' for organisation '{}'",
            repository_id, organisation_id
        ))
    }

    /// Whether this error means the requested entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
