//! Plugin registry: validated configurations, approval state, and handles to
//! the execution contexts each plugin currently has alive.
//!
//! Lock order is registry first, then the permission store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use plugdock_core::{CapabilitySet, HostError, HostResult, PluginConfig, ViewType};
use tracing::{info, warn};

use crate::executor::{ExecutionHandle, ViewHandle};
use crate::lifecycle::PluginState;
use crate::permissions::PermissionStore;

struct PluginRecord {
    config: PluginConfig,
    background: Option<Arc<ExecutionHandle>>,
    views: Vec<Arc<ViewHandle>>,
}

impl PluginRecord {
    fn active_contexts(&self) -> usize {
        self.views.len() + usize::from(self.background.is_some())
    }
}

/// Point-in-time view of one registered plugin.
#[derive(Debug, Clone)]
pub struct RegisteredPlugin {
    pub id: String,
    pub config: PluginConfig,
    pub granted: CapabilitySet,
    pub approved: bool,
    pub background: Option<Arc<ExecutionHandle>>,
    pub views: Vec<Arc<ViewHandle>>,
}

impl RegisteredPlugin {
    pub fn state(&self) -> PluginState {
        PluginState::classify(self.approved, self.background.is_some() || !self.views.is_empty())
    }
}

pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginRecord>>,
    permissions: Arc<PermissionStore>,
}

impl PluginRegistry {
    pub fn new(permissions: Arc<PermissionStore>) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            permissions,
        }
    }

    pub fn permissions(&self) -> &Arc<PermissionStore> {
        &self.permissions
    }

    /// Registers an unapproved plugin with nothing granted. Returns false,
    /// without side effects, if the id is taken.
    pub fn register(&self, config: PluginConfig) -> bool {
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&config.id) {
            warn!(plugin = %config.id, "Plugin already registered");
            return false;
        }
        if !self.permissions.insert(&config.id, config.capabilities.clone()) {
            return false;
        }
        info!(plugin = %config.id, version = %config.version, "Plugin registered");
        plugins.insert(
            config.id.clone(),
            PluginRecord {
                config,
                background: None,
                views: Vec::new(),
            },
        );
        true
    }

    pub fn approve(&self, plugin_id: &str) -> HostResult<CapabilitySet> {
        let _plugins = self.plugins.read();
        self.permissions.approve(plugin_id)
    }

    pub fn reapprove(&self, plugin_id: &str, capabilities: &CapabilitySet) -> HostResult<CapabilitySet> {
        let _plugins = self.plugins.read();
        self.permissions.reapprove(plugin_id, capabilities)
    }

    pub fn revoke(&self, plugin_id: &str) -> HostResult<()> {
        let _plugins = self.plugins.read();
        self.permissions.revoke(plugin_id)
    }

    /// Fails while the plugin still has a background or any view alive.
    pub fn unregister(&self, plugin_id: &str, reason: &str) -> HostResult<PluginConfig> {
        let mut plugins = self.plugins.write();
        let record = plugins
            .get(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        let contexts = record.active_contexts();
        if contexts > 0 {
            warn!(plugin = %plugin_id, contexts, reason, "Refusing to unregister plugin with live contexts");
            return Err(HostError::ExecutionActive {
                plugin_id: plugin_id.to_string(),
                contexts,
            });
        }
        let record = plugins
            .remove(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        self.permissions.remove(plugin_id);
        info!(plugin = %plugin_id, reason, "Plugin unregistered");
        Ok(record.config)
    }

    pub fn has_capability(&self, plugin_id: &str, capability: plugdock_core::Capability) -> bool {
        self.permissions.has_capability(plugin_id, capability)
    }

    pub fn is_registered(&self, plugin_id: &str) -> bool {
        self.plugins.read().contains_key(plugin_id)
    }

    pub fn is_approved(&self, plugin_id: &str) -> bool {
        self.permissions.is_approved(plugin_id)
    }

    pub fn config(&self, plugin_id: &str) -> Option<PluginConfig> {
        self.plugins.read().get(plugin_id).map(|r| r.config.clone())
    }

    pub fn snapshot(&self, plugin_id: &str) -> Option<RegisteredPlugin> {
        let plugins = self.plugins.read();
        let record = plugins.get(plugin_id)?;
        let (granted, approved) = self.permissions.grant_state(plugin_id).unwrap_or_default();
        Some(RegisteredPlugin {
            id: plugin_id.to_string(),
            config: record.config.clone(),
            granted,
            approved,
            background: record.background.clone(),
            views: record.views.clone(),
        })
    }

    /// Snapshots of every plugin, ordered by id.
    pub fn list(&self) -> Vec<RegisteredPlugin> {
        let mut ids: Vec<String> = self.plugins.read().keys().cloned().collect();
        ids.sort();
        ids.iter().filter_map(|id| self.snapshot(id)).collect()
    }

    pub fn active_contexts(&self, plugin_id: &str) -> usize {
        self.plugins
            .read()
            .get(plugin_id)
            .map(PluginRecord::active_contexts)
            .unwrap_or(0)
    }

    // Background handle

    /// Stores the plugin's background handle. Fails if the plugin is gone or
    /// already has one.
    pub fn set_background(&self, plugin_id: &str, handle: Arc<ExecutionHandle>) -> HostResult<()> {
        let mut plugins = self.plugins.write();
        let record = plugins
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        if record.background.is_some() {
            return Err(HostError::execution(plugin_id, "background already running"));
        }
        record.background = Some(handle);
        Ok(())
    }

    pub fn background(&self, plugin_id: &str) -> Option<Arc<ExecutionHandle>> {
        self.plugins
            .read()
            .get(plugin_id)
            .and_then(|r| r.background.clone())
    }

    pub fn take_background(&self, plugin_id: &str) -> Option<Arc<ExecutionHandle>> {
        self.plugins
            .write()
            .get_mut(plugin_id)
            .and_then(|r| r.background.take())
    }

    /// Removes the background handle only if it is still `handle`.
    pub fn take_background_if(&self, plugin_id: &str, handle: &Arc<ExecutionHandle>) -> bool {
        let mut plugins = self.plugins.write();
        match plugins.get_mut(plugin_id) {
            Some(record) if record.background.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle)) => {
                record.background = None;
                true
            }
            _ => false,
        }
    }

    // View handles

    pub fn add_view(&self, plugin_id: &str, view: Arc<ViewHandle>) -> HostResult<()> {
        let mut plugins = self.plugins.write();
        let record = plugins
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        record.views.push(view);
        Ok(())
    }

    pub fn remove_view(&self, plugin_id: &str, view_id: &str) -> Option<Arc<ViewHandle>> {
        let mut plugins = self.plugins.write();
        let record = plugins.get_mut(plugin_id)?;
        let index = record.views.iter().position(|v| v.view_id() == view_id)?;
        Some(record.views.remove(index))
    }

    pub fn take_views(&self, plugin_id: &str) -> Vec<Arc<ViewHandle>> {
        self.plugins
            .write()
            .get_mut(plugin_id)
            .map(|r| std::mem::take(&mut r.views))
            .unwrap_or_default()
    }

    /// A view of `plugin_id` by id. Views of other plugins are never returned.
    pub fn view(&self, plugin_id: &str, view_id: &str) -> Option<Arc<ViewHandle>> {
        self.plugins
            .read()
            .get(plugin_id)
            .and_then(|r| r.views.iter().find(|v| v.view_id() == view_id).cloned())
    }

    pub fn views_of_type(&self, plugin_id: &str, view_type: ViewType) -> Vec<Arc<ViewHandle>> {
        self.plugins
            .read()
            .get(plugin_id)
            .map(|r| {
                r.views
                    .iter()
                    .filter(|v| v.view_type() == view_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_views(&self, plugin_id: &str) -> Vec<Arc<ViewHandle>> {
        self.plugins
            .read()
            .get(plugin_id)
            .map(|r| r.views.clone())
            .unwrap_or_default()
    }
}
