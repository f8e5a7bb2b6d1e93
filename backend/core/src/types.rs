use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;

/// Entry point for one plugin feature (background process or a view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDescriptor {
    /// Location handed to the execution platform (URL or path).
    pub entry: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EntryDescriptor {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            enabled: true,
        }
    }
}

/// Kinds of visible views a plugin may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Summary,
    Expand,
}

impl ViewType {
    pub const ALL: [ViewType; 2] = [ViewType::Summary, ViewType::Expand];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Summary => "summary",
            ViewType::Expand => "expand",
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(ViewType::Summary),
            "expand" => Ok(ViewType::Expand),
            other => Err(format!("unknown view type '{other}'")),
        }
    }
}

/// Immutable plugin descriptor produced by a loader.
///
/// The registry keeps its own copy; nothing mutates it after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub background: Option<EntryDescriptor>,
    #[serde(default)]
    pub summary: Option<EntryDescriptor>,
    #[serde(default)]
    pub expand: Option<EntryDescriptor>,
    /// Requested capabilities. Advisory until approval copies them.
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// Bundled with the host application rather than installed by a user.
    #[serde(default)]
    pub internal: bool,
}

impl PluginConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: None,
            author: None,
            background: None,
            summary: None,
            expand: None,
            capabilities: CapabilitySet::default(),
            internal: false,
        }
    }

    pub fn with_background(mut self, entry: impl Into<String>) -> Self {
        self.background = Some(EntryDescriptor::new(entry));
        self
    }

    pub fn with_view(mut self, view_type: ViewType, entry: impl Into<String>) -> Self {
        let descriptor = Some(EntryDescriptor::new(entry));
        match view_type {
            ViewType::Summary => self.summary = descriptor,
            ViewType::Expand => self.expand = descriptor,
        }
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Background entry, if the feature is declared and enabled.
    pub fn background_entry(&self) -> Option<&str> {
        self.background
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.entry.as_str())
    }

    /// View entry for `view_type`, if declared and enabled.
    pub fn view_entry(&self, view_type: ViewType) -> Option<&str> {
        let descriptor = match view_type {
            ViewType::Summary => self.summary.as_ref(),
            ViewType::Expand => self.expand.as_ref(),
        };
        descriptor.filter(|d| d.enabled).map(|d| d.entry.as_str())
    }
}

/// Result of a status query against a plugin's background process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub plugin_id: String,
    pub active: bool,
    /// Whatever the background's `getStatus()` reported.
    pub status: Option<serde_json::Value>,
}

impl PluginStatus {
    pub fn inactive(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            active: false,
            status: None,
        }
    }
}
