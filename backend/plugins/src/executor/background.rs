//! Background executor: at most one background context per plugin.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use plugdock_core::{HostError, HostEventKind, HostResult, PluginStatus};
use tracing::{debug, info};

use super::{ExecutionHandle, ExecutionHost};
use crate::platform::ContextKind;

pub struct BackgroundExecutor {
    host: Arc<ExecutionHost>,
    start_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BackgroundExecutor {
    pub fn new(host: Arc<ExecutionHost>) -> Self {
        Self {
            host,
            start_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, plugin_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.start_locks
            .lock()
            .entry(plugin_id.to_string())
            .or_default()
            .clone()
    }

    /// Starts the plugin's background, or returns the one already running.
    pub async fn start(&self, plugin_id: &str) -> HostResult<Arc<ExecutionHandle>> {
        let lock = self.lock_for(plugin_id);
        let _guard = lock.lock().await;

        let registry = &self.host.registry;
        let config = registry
            .config(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        if !registry.is_approved(plugin_id) {
            return Err(HostError::NotApproved(plugin_id.to_string()));
        }
        if let Some(existing) = registry.background(plugin_id) {
            debug!(plugin = %plugin_id, "Background already running");
            return Ok(existing);
        }
        let entry = config
            .background_entry()
            .ok_or_else(|| HostError::execution(plugin_id, "plugin declares no background entry"))?;

        let handle = Arc::new(
            self.host
                .launch(plugin_id, entry, ContextKind::Worker)
                .await?,
        );
        if let Err(e) = self.host.initialize(&handle).await {
            self.host.teardown(&handle).await;
            self.host.report(plugin_id, &e);
            return Err(e);
        }
        if let Err(e) = registry.set_background(plugin_id, handle.clone()) {
            self.host.teardown(&handle).await;
            return Err(e);
        }
        self.host.watch(&handle, |registry, handle| {
            registry.take_background_if(handle.plugin_id(), handle)
        });

        info!(plugin = %plugin_id, context = %handle.context().id, "Background started");
        self.host
            .events
            .emit(plugin_id, HostEventKind::BackgroundStarted);
        Ok(handle)
    }

    /// Returns false if no background was running.
    pub async fn stop(&self, plugin_id: &str, reason: &str) -> bool {
        let lock = self.lock_for(plugin_id);
        let _guard = lock.lock().await;

        let Some(handle) = self.host.registry.take_background(plugin_id) else {
            return false;
        };
        self.host.teardown(&handle).await;
        info!(plugin = %plugin_id, reason, "Background stopped");
        self.host.events.emit(
            plugin_id,
            HostEventKind::BackgroundStopped {
                reason: reason.to_string(),
            },
        );
        true
    }

    pub fn is_active(&self, plugin_id: &str) -> bool {
        self.host.registry.background(plugin_id).is_some()
    }

    /// The background's own status report, or `active: false` when none runs.
    pub async fn status(&self, plugin_id: &str) -> HostResult<PluginStatus> {
        match self.host.registry.background(plugin_id) {
            None => Ok(PluginStatus::inactive(plugin_id)),
            Some(handle) => {
                let status = handle.get_status().await?;
                Ok(PluginStatus {
                    plugin_id: plugin_id.to_string(),
                    active: true,
                    status: Some(status),
                })
            }
        }
    }

    /// Drops the start lock of a plugin that is gone.
    pub(crate) fn forget(&self, plugin_id: &str) {
        self.start_locks.lock().remove(plugin_id);
    }
}
