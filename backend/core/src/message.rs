use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::types::ViewType;

/// Where a [`PluginMessage`] should be delivered, always within one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    Background,
    /// Every open view of this type.
    ViewType(ViewType),
    AllViews,
    /// One specific view instance.
    View(String),
}

impl MessageTarget {
    pub fn as_wire(&self) -> &str {
        match self {
            MessageTarget::Background => "background",
            MessageTarget::ViewType(t) => t.as_str(),
            MessageTarget::AllViews => "all-views",
            MessageTarget::View(id) => id,
        }
    }
}

impl From<&str> for MessageTarget {
    fn from(value: &str) -> Self {
        match value {
            "background" => MessageTarget::Background,
            "summary" => MessageTarget::ViewType(ViewType::Summary),
            "expand" => MessageTarget::ViewType(ViewType::Expand),
            "all-views" => MessageTarget::AllViews,
            other => MessageTarget::View(other.to_string()),
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for MessageTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for MessageTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(MessageTarget::from(raw.as_str()))
    }
}

/// A message between components of the same plugin. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMessage {
    pub id: String,
    pub plugin_id: String,
    /// `background` or the sending view's id.
    pub source: String,
    pub target: MessageTarget,
    pub topic: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PluginMessage {
    pub fn new(
        plugin_id: impl Into<String>,
        source: impl Into<String>,
        target: MessageTarget,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plugin_id: plugin_id.into(),
            source: source.into(),
            target,
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}
