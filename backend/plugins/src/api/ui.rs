//! UI API: tabs in the host application, gated on the `dom` capability.
//!
//! Tabs belong to the plugin that opened them; no other plugin may update or
//! close them.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use plugdock_core::{Capability, HostError, HostEventKind, HostResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{boundary, CapabilityApi};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabOptions {
    pub title: String,
    /// Entry to render in the tab, if any.
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Host application's tab surface.
#[async_trait]
pub trait UiBridge: Send + Sync {
    async fn open_tab(&self, tab_id: &str, plugin_id: &str, options: &TabOptions) -> Result<()>;
    async fn update_tab(&self, tab_id: &str, options: &TabOptions) -> Result<()>;
    async fn close_tab(&self, tab_id: &str) -> Result<()>;
}

/// Accepts everything and renders nothing.
pub struct NullUiBridge;

#[async_trait]
impl UiBridge for NullUiBridge {
    async fn open_tab(&self, tab_id: &str, plugin_id: &str, _options: &TabOptions) -> Result<()> {
        debug!(plugin = %plugin_id, tab = %tab_id, "Tab opened (no ui attached)");
        Ok(())
    }

    async fn update_tab(&self, _tab_id: &str, _options: &TabOptions) -> Result<()> {
        Ok(())
    }

    async fn close_tab(&self, _tab_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Which plugin owns which tab.
#[derive(Default)]
pub struct TabOwnership {
    owners: Mutex<HashMap<String, String>>,
}

impl TabOwnership {
    pub fn claim(&self, tab_id: &str, plugin_id: &str) {
        self.owners
            .lock()
            .insert(tab_id.to_string(), plugin_id.to_string());
    }

    pub fn owner(&self, tab_id: &str) -> Option<String> {
        self.owners.lock().get(tab_id).cloned()
    }

    pub fn release(&self, tab_id: &str) -> Option<String> {
        self.owners.lock().remove(tab_id)
    }

    /// Drops every tab owned by `plugin_id`, returning their ids.
    pub fn release_all(&self, plugin_id: &str) -> Vec<String> {
        let mut owners = self.owners.lock();
        let tabs: Vec<String> = owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == plugin_id)
            .map(|(tab, _)| tab.clone())
            .collect();
        for tab in &tabs {
            owners.remove(tab);
        }
        tabs
    }
}

pub struct UiApi<'a> {
    api: &'a CapabilityApi,
}

impl<'a> UiApi<'a> {
    pub(super) fn new(api: &'a CapabilityApi) -> Self {
        Self { api }
    }

    /// Opens a tab and returns its id.
    pub async fn open_tab(&self, options: &TabOptions) -> HostResult<String> {
        self.api.require(Capability::Dom, "ui.open_tab")?;
        let options: TabOptions = boundary::transfer(options)?;
        let tab_id = format!("tab-{}", Uuid::new_v4());
        self.api
            .ui_bridge()
            .open_tab(&tab_id, self.api.plugin_id(), &options)
            .await?;
        self.api.tabs().claim(&tab_id, self.api.plugin_id());
        Ok(tab_id)
    }

    pub async fn update_tab(&self, tab_id: &str, options: &TabOptions) -> HostResult<()> {
        self.api.require(Capability::Dom, "ui.update_tab")?;
        self.check_owner(tab_id, "ui.update_tab")?;
        let options: TabOptions = boundary::transfer(options)?;
        self.api.ui_bridge().update_tab(tab_id, &options).await?;
        Ok(())
    }

    pub async fn close_tab(&self, tab_id: &str) -> HostResult<()> {
        self.api.require(Capability::Dom, "ui.close_tab")?;
        self.check_owner(tab_id, "ui.close_tab")?;
        self.api.ui_bridge().close_tab(tab_id).await?;
        self.api.tabs().release(tab_id);
        Ok(())
    }

    fn check_owner(&self, tab_id: &str, operation: &str) -> HostResult<()> {
        let plugin_id = self.api.plugin_id();
        if self.api.tabs().owner(tab_id).as_deref() == Some(plugin_id) {
            return Ok(());
        }
        warn!(plugin = %plugin_id, tab = %tab_id, operation, "Tab access outside plugin ownership");
        self.api.emit(HostEventKind::PermissionDenied {
            capability: Capability::Dom.to_string(),
            operation: operation.to_string(),
        });
        Err(HostError::TabNotOwned {
            plugin_id: plugin_id.to_string(),
            tab_id: tab_id.to_string(),
        })
    }
}
