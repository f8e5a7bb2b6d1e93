//! Permission Store
//!
//! Holds, per plugin, the requested capabilities, the granted capabilities and
//! the approval flag. `has_capability` is the only permission predicate in the
//! host; every capability-checked API call goes through it.

use std::collections::HashMap;

use parking_lot::RwLock;
use plugdock_core::{Capability, CapabilitySet, HostError, HostResult};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct PermissionEntry {
    requested: CapabilitySet,
    granted: CapabilitySet,
    approved: bool,
}

/// Granted set and approval flag share one record, so a reader never sees an
/// approved plugin with a stale grant or the reverse.
#[derive(Default)]
pub struct PermissionStore {
    entries: RwLock<HashMap<String, PermissionEntry>>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a newly registered plugin: nothing granted, not approved.
    /// Returns false if the plugin is already tracked.
    pub fn insert(&self, plugin_id: &str, requested: CapabilitySet) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(plugin_id) {
            return false;
        }
        entries.insert(
            plugin_id.to_string(),
            PermissionEntry {
                requested,
                ..Default::default()
            },
        );
        true
    }

    pub fn remove(&self, plugin_id: &str) -> bool {
        self.entries.write().remove(plugin_id).is_some()
    }

    /// Grants everything the plugin requested.
    pub fn approve(&self, plugin_id: &str) -> HostResult<CapabilitySet> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        if entry.approved {
            return Err(HostError::AlreadyApproved(plugin_id.to_string()));
        }
        entry.granted = entry.requested.clone();
        entry.approved = true;
        info!(plugin = %plugin_id, granted = ?entry.granted.allowed(), "Plugin approved");
        Ok(entry.granted.clone())
    }

    /// Replaces the grant of an approved plugin with `requested ∩ capabilities`.
    pub fn reapprove(&self, plugin_id: &str, capabilities: &CapabilitySet) -> HostResult<CapabilitySet> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        if !entry.approved {
            return Err(HostError::NotApproved(plugin_id.to_string()));
        }
        entry.granted = entry.requested.intersect(capabilities);
        info!(plugin = %plugin_id, granted = ?entry.granted.allowed(), "Plugin grant updated");
        Ok(entry.granted.clone())
    }

    /// Clears the grant and the approval flag.
    pub fn revoke(&self, plugin_id: &str) -> HostResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        entry.granted = CapabilitySet::none();
        entry.approved = false;
        warn!(plugin = %plugin_id, "Plugin approval revoked");
        Ok(())
    }

    /// True only if the plugin is approved and `capability` is granted.
    pub fn has_capability(&self, plugin_id: &str, capability: Capability) -> bool {
        let entries = self.entries.read();
        let allowed = entries
            .get(plugin_id)
            .map(|e| e.approved && e.granted.allows(capability))
            .unwrap_or(false);
        if !allowed {
            debug!(plugin = %plugin_id, capability = %capability, "Capability check failed");
        }
        allowed
    }

    /// Errors with `PermissionDenied` unless `has_capability` holds.
    pub fn assert_capability(
        &self,
        plugin_id: &str,
        capability: Capability,
        operation: &str,
    ) -> HostResult<()> {
        if self.has_capability(plugin_id, capability) {
            return Ok(());
        }
        warn!(plugin = %plugin_id, capability = %capability, operation, "Plugin permission denied");
        Err(HostError::PermissionDenied {
            plugin_id: plugin_id.to_string(),
            capability,
            operation: operation.to_string(),
        })
    }

    pub fn is_approved(&self, plugin_id: &str) -> bool {
        self.entries
            .read()
            .get(plugin_id)
            .map(|e| e.approved)
            .unwrap_or(false)
    }

    pub fn granted(&self, plugin_id: &str) -> Option<CapabilitySet> {
        self.entries.read().get(plugin_id).map(|e| e.granted.clone())
    }

    pub fn requested(&self, plugin_id: &str) -> Option<CapabilitySet> {
        self.entries.read().get(plugin_id).map(|e| e.requested.clone())
    }

    /// Granted set and approval flag read under one guard.
    pub fn grant_state(&self, plugin_id: &str) -> Option<(CapabilitySet, bool)> {
        self.entries
            .read()
            .get(plugin_id)
            .map(|e| (e.granted.clone(), e.approved))
    }
}
