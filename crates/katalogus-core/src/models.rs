//! Catalog data model
//!
//! Plugins come in three flavours that share a common base:
//! - [`Boefje`]: scans an object and produces raw data (mime types)
//! - [`Normalizer`]: turns raw data into objects
//! - [`Bit`]: business rule that derives findings from objects
//!
//! On the wire a plugin is a flat JSON object discriminated by its `type`
//! field, e.g. `{"type": "boefje", "id": "dns-records", ...}`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository id reserved for the plugins bundled with the service
pub const LOCAL_REPOSITORY_ID: &str = "LOCAL";

/// Fields shared by every plugin variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginBase {
    /// Plugin id, unique within its repository
    pub id: String,

    /// Repository the plugin was sourced from, filled in by the client
    #[serde(default)]
    pub repository_id: String,

    /// Display name
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

    /// Setting keys the plugin reads, in declaration order
    #[serde(default)]
    pub environment_keys: Vec<String>,

    /// Default enabled state as declared by the source
    #[serde(default)]
    pub enabled: bool,
}

impl PluginBase {
    /// Create a base with the required fields set and everything else empty
    pub fn new(
        id: impl Into<String>,
        repository_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            repository_id: repository_id.into(),
            name: name.into(),
            version: None,
            description: None,
            authors: None,
            created: None,
            related: None,
            environment_keys: Vec::new(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boefje {
    #[serde(flatten)]
    pub base: PluginBase,

    /// Minimum clearance level of the objects this boefje may scan
    #[serde(default = "default_scan_level")]
    pub scan_level: u8,

    /// Object types this boefje accepts as input
    #[serde(default)]
    pub consumes: BTreeSet<String>,

    /// Mime types of the raw data this boefje emits
    #[serde(default)]
    pub produces: BTreeSet<String>,

    #[serde(default)]
    pub options: Option<Vec<String>>,
}

fn default_scan_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalizer {
    #[serde(flatten)]
    pub base: PluginBase,

    /// Mime types this normalizer parses
    #[serde(default)]
    pub consumes: Vec<String>,

    /// Object types this normalizer yields
    #[serde(default)]
    pub produces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    #[serde(flatten)]
    pub base: PluginBase,

    /// The single object type the bit is evaluated against
    pub consumes: String,

    #[serde(default)]
    pub produces: Vec<String>,

    /// Object attributes the bit depends on, e.g. `WebPage.address`
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Discriminant of a [`Plugin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Boefje,
    Normalizer,
    Bit,
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginType::Boefje => write!(f, "boefje"),
            PluginType::Normalizer => write!(f, "normalizer"),
            PluginType::Bit => write!(f, "bit"),
        }
    }
}

/// A catalog entry of any type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Plugin {
    Boefje(Boefje),
    Normalizer(Normalizer),
    Bit(Bit),
}

impl Plugin {
    pub fn base(&self) -> &PluginBase {
        match self {
            Plugin::Boefje(boefje) => &boefje.base,
            Plugin::Normalizer(normalizer) => &normalizer.base,
            Plugin::Bit(bit) => &bit.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut PluginBase {
        match self {
            Plugin::Boefje(boefje) => &mut boefje.base,
            Plugin::Normalizer(normalizer) => &mut normalizer.base,
            Plugin::Bit(bit) => &mut bit.base,
        }
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            Plugin::Boefje(_) => PluginType::Boefje,
            Plugin::Normalizer(_) => PluginType::Normalizer,
            Plugin::Bit(_) => PluginType::Bit,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn repository_id(&self) -> &str {
        &self.base().repository_id
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn is_enabled(&self) -> bool {
        self.base().enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.base_mut().enabled = enabled;
    }

    /// Attribute the plugin to a repository
    pub fn set_repository_id(&mut self, repository_id: &str) {
        self.base_mut().repository_id = repository_id.to_string();
    }

    pub fn as_boefje(&self) -> Option<&Boefje> {
        match self {
            Plugin::Boefje(boefje) => Some(boefje),
            _ => None,
        }
    }

    pub fn as_normalizer(&self) -> Option<&Normalizer> {
        match self {
            Plugin::Normalizer(normalizer) => Some(normalizer),
            _ => None,
        }
    }

    pub fn as_bit(&self) -> Option<&Bit> {
        match self {
            Plugin::Bit(bit) => Some(bit),
            _ => None,
        }
    }
}

/// A source of plugins registered for an organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub base_url: String,
}

impl Repository {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    /// The pseudo-repository standing for the bundled plugins
    pub fn local() -> Self {
        Self::new(LOCAL_REPOSITORY_ID, "Local Plugin Repository", "http://dev.null")
    }

    pub fn is_local(&self) -> bool {
        self.id == LOCAL_REPOSITORY_ID
    }
}

/// Per-organisation override of a plugin's enabled flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginState {
    pub enabled: bool,
}
