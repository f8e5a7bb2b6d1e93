use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ViewType;

/// Something the host UI may want to reflect for a single plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEventKind {
    Loaded,
    LoadFailed { error: String },
    Registered,
    Approved { capabilities: Vec<String> },
    Revoked,
    BackgroundStarted,
    BackgroundStopped { reason: String },
    ViewOpened { view_id: String, view_type: ViewType },
    ViewClosed { view_id: String },
    ExecutionFailed { error: String },
    ContractViolation { missing: Vec<String> },
    PermissionDenied { capability: String, operation: String },
    DeliveryFailed { topic: String, target: String, error: String },
    MessageDropped { reason: String },
    Unregistered { reason: String },
}

/// A host event tagged with the plugin it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub plugin_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: HostEventKind,
}

impl HostEvent {
    pub fn new(plugin_id: impl Into<String>, kind: HostEventKind) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Failures the UI should surface as an error state.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            HostEventKind::LoadFailed { .. }
                | HostEventKind::ExecutionFailed { .. }
                | HostEventKind::ContractViolation { .. }
                | HostEventKind::PermissionDenied { .. }
                | HostEventKind::DeliveryFailed { .. }
        )
    }
}

impl std::fmt::Display for HostEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}
