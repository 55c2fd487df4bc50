//! Plugin repository clients
//!
//! Every source of plugins answers the same two questions: which plugins does
//! a repository hold, and what is a single plugin. The service only talks to
//! [`PluginRepositoryClient`], so remote, seeded and bundled repositories are
//! interchangeable.

pub mod http;
pub mod memory;

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{Plugin, Repository};

pub use http::HttpPluginRepositoryClient;
pub use memory::InMemoryPluginRepositoryClient;

/// Plugins of a repository keyed by plugin id
pub type PluginMap = HashMap<String, Plugin>;

/// Read access to the plugins of a repository
pub trait PluginRepositoryClient: Send + Sync {
    /// All plugins held by `repository`
    fn get_plugins(&self, repository: &Repository) -> Result<PluginMap>;

    /// A single plugin, `NotFound` if the repository does not hold it
    fn get_plugin(&self, repository: &Repository, plugin_id: &str) -> Result<Plugin>;
}
