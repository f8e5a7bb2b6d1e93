//! Plugin lifecycle states.
//!
//! `unregistered → registered → approved → executing → … → unregistered`.
//! An executing plugin may have its approval revoked; its contexts keep
//! running but every capability-checked call fails.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Registered but not approved. Nothing is granted.
    Registered,
    Approved,
    /// At least one background or view context is alive.
    Executing,
}

impl PluginState {
    pub fn classify(approved: bool, has_contexts: bool) -> Self {
        match (approved, has_contexts) {
            (_, true) => PluginState::Executing,
            (true, false) => PluginState::Approved,
            (false, false) => PluginState::Registered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Approved => "approved",
            PluginState::Executing => "executing",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
