//! Plugin Manager
//!
//! Orchestration facade over the whole runtime:
//! load → register → approve → execute → stop → unregister.

use std::sync::Arc;

use plugdock_config::HostConfig;
use plugdock_core::{
    CapabilitySet, HostError, HostEvent, HostEventKind, HostResult, PluginConfig, PluginMessage,
    PluginStatus, ViewType,
};
use plugdock_logging::AuditLogger;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiFactory, HostServices};
use crate::bus::{BusError, MessageBus};
use crate::event_bus::EventBus;
use crate::executor::{BackgroundExecutor, ExecutionHandle, ExecutionHost, ViewExecutor, ViewHandle};
use crate::lifecycle::PluginState;
use crate::loader::PluginLoader;
use crate::manifest;
use crate::permissions::PermissionStore;
use crate::platform::{ContextHandle, ExecutionPlatform, InboundFrame};
use crate::registry::{PluginRegistry, RegisteredPlugin};

pub struct PluginManager {
    loader: Arc<dyn PluginLoader>,
    registry: Arc<PluginRegistry>,
    bus: Arc<MessageBus>,
    api_factory: Arc<ApiFactory>,
    background: BackgroundExecutor,
    views: ViewExecutor,
    events: EventBus,
}

impl PluginManager {
    pub fn new(
        config: &HostConfig,
        loader: Arc<dyn PluginLoader>,
        platform: Arc<dyn ExecutionPlatform>,
        services: HostServices,
    ) -> Self {
        let events = EventBus::with_capacity(config.event_capacity());
        let permissions = Arc::new(PermissionStore::new());
        let registry = Arc::new(PluginRegistry::new(permissions.clone()));
        let bus = Arc::new(MessageBus::new(registry.clone(), events.clone()));
        let api_factory = Arc::new(ApiFactory::new(
            permissions,
            services,
            bus.clone(),
            events.clone(),
        ));
        let host = Arc::new(ExecutionHost::new(
            registry.clone(),
            platform,
            api_factory.clone(),
            events.clone(),
            config.timeouts(),
            config.channel_buffer(),
        ));

        Self {
            loader,
            registry,
            bus,
            api_factory,
            background: BackgroundExecutor::new(host.clone()),
            views: ViewExecutor::new(host),
            events,
        }
    }

    // Loading

    /// Loads and validates one configuration. Does not register it.
    pub async fn load_plugin(&self, plugin_id: &str) -> HostResult<PluginConfig> {
        let result = match self.loader.load_plugin_by_id(plugin_id).await {
            Ok(Some(config)) if config.id != plugin_id => Err(HostError::load(
                plugin_id,
                format!("loader returned configuration for '{}'", config.id),
            )),
            Ok(Some(config)) => manifest::validate(&config).map(|_| config),
            Ok(None) => Err(HostError::load(plugin_id, "no configuration found")),
            Err(e) => Err(HostError::load(plugin_id, format!("{e:#}"))),
        };
        self.report_load(plugin_id, &result);
        result
    }

    /// Every valid configuration the loader knows. Invalid ones are reported
    /// and skipped.
    pub async fn load_all_plugins(&self) -> HostResult<Vec<PluginConfig>> {
        let configs = self
            .loader
            .load_all_plugins()
            .await
            .map_err(|e| HostError::load("<all>", format!("{e:#}")))?;
        let mut valid = Vec::with_capacity(configs.len());
        for config in configs {
            let result = manifest::validate(&config).map(|_| config);
            let id = match &result {
                Ok(config) => config.id.clone(),
                Err(HostError::Load { plugin_id, .. }) => plugin_id.clone(),
                Err(_) => String::from("<unknown>"),
            };
            self.report_load(&id, &result);
            if let Ok(config) = result {
                valid.push(config);
            }
        }
        info!(count = valid.len(), "Loaded plugin configurations");
        Ok(valid)
    }

    fn report_load(&self, plugin_id: &str, result: &HostResult<PluginConfig>) {
        match result {
            Ok(config) => {
                debug!(plugin = %plugin_id, version = %config.version, "Plugin configuration loaded");
                self.events.emit(plugin_id, HostEventKind::Loaded);
            }
            Err(e) => {
                warn!(plugin = %plugin_id, error = %e, "Plugin failed to load");
                self.events.emit(
                    plugin_id,
                    HostEventKind::LoadFailed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    // Approval

    /// Registers a configuration. `Ok(false)` when the id is already taken.
    pub fn register_plugin(&self, config: PluginConfig) -> HostResult<bool> {
        manifest::validate(&config)?;
        let id = config.id.clone();
        let registered = self.registry.register(config);
        if registered {
            self.events.emit(&id, HostEventKind::Registered);
        }
        Ok(registered)
    }

    pub fn approve_plugin(&self, plugin_id: &str) -> HostResult<CapabilitySet> {
        let granted = self.registry.approve(plugin_id)?;
        self.emit_approved(plugin_id, &granted);
        Ok(granted)
    }

    /// Narrows (or restores, up to the request) an approved plugin's grant.
    pub fn reapprove_plugin(&self, plugin_id: &str, capabilities: &CapabilitySet) -> HostResult<CapabilitySet> {
        let granted = self.registry.reapprove(plugin_id, capabilities)?;
        self.emit_approved(plugin_id, &granted);
        Ok(granted)
    }

    pub fn revoke_plugin(&self, plugin_id: &str) -> HostResult<()> {
        self.registry.revoke(plugin_id)?;
        self.events.emit(plugin_id, HostEventKind::Revoked);
        Ok(())
    }

    fn emit_approved(&self, plugin_id: &str, granted: &CapabilitySet) {
        self.events.emit(
            plugin_id,
            HostEventKind::Approved {
                capabilities: granted.allowed().iter().map(ToString::to_string).collect(),
            },
        );
    }

    // Execution

    /// Starts the background; idempotent while it runs.
    pub async fn execute_plugin(&self, plugin_id: &str) -> HostResult<Arc<ExecutionHandle>> {
        self.background.start(plugin_id).await
    }

    pub async fn open_view(&self, plugin_id: &str, view_type: ViewType) -> HostResult<Arc<ViewHandle>> {
        self.views.open(plugin_id, view_type).await
    }

    pub async fn close_view(&self, plugin_id: &str, view_id: &str) -> bool {
        self.views.close(plugin_id, view_id).await
    }

    /// Stops the background. Returns false if it was not running.
    pub async fn stop_plugin(&self, plugin_id: &str, reason: &str) -> bool {
        self.background.stop(plugin_id, reason).await
    }

    /// Stops the background, closes every view, closes the plugin's tabs,
    /// then removes it.
    pub async fn unregister_plugin(&self, plugin_id: &str, reason: &str) -> HostResult<()> {
        if !self.registry.is_registered(plugin_id) {
            return Err(HostError::NotRegistered(plugin_id.to_string()));
        }
        self.background.stop(plugin_id, reason).await;
        self.views.close_all(plugin_id).await;
        let tabs = self.api_factory.release_tabs(plugin_id).await;
        if tabs > 0 {
            debug!(plugin = %plugin_id, tabs, "Closed plugin tabs");
        }

        self.registry.unregister(plugin_id, reason)?;
        self.background.forget(plugin_id);
        self.events.emit(
            plugin_id,
            HostEventKind::Unregistered {
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    pub fn is_plugin_active(&self, plugin_id: &str) -> bool {
        self.background.is_active(plugin_id)
    }

    pub async fn get_plugin_status(&self, plugin_id: &str) -> HostResult<PluginStatus> {
        self.background.status(plugin_id).await
    }

    pub fn plugin_state(&self, plugin_id: &str) -> Option<PluginState> {
        self.registry.snapshot(plugin_id).map(|p| p.state())
    }

    pub fn plugins(&self) -> Vec<RegisteredPlugin> {
        self.registry.list()
    }

    // Messaging

    /// Sends a host-originated message to a plugin's components.
    pub async fn send_message(&self, message: PluginMessage) -> HostResult<usize> {
        Ok(self.bus.send(message).await?)
    }

    pub async fn handle_inbound(&self, origin: &ContextHandle, raw: Value) -> Result<usize, BusError> {
        self.bus.handle_inbound(origin, raw).await
    }

    /// Feeds messages posted by contexts into the bus until the platform
    /// side closes.
    pub fn spawn_inbound_pump(&self, mut inbound: mpsc::UnboundedReceiver<InboundFrame>) -> JoinHandle<()> {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if let Err(e) = bus.handle_inbound(&frame.origin, frame.raw).await {
                    debug!(plugin = %frame.origin.plugin_id, error = %e, "Inbound message not delivered");
                }
            }
        })
    }

    /// Stops every background and closes every view. Plugins stay registered.
    pub async fn shutdown(&self) {
        let plugins = self.registry.list();
        for plugin in &plugins {
            self.background.stop(&plugin.id, "host shutdown").await;
            self.views.close_all(&plugin.id).await;
        }
        info!(plugins = plugins.len(), "Plugin host shut down");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Writes every host event to the `plugin_audit` log target until the
    /// manager is dropped. Resolves to the number of events written.
    pub fn spawn_audit_log(&self) -> JoinHandle<u64> {
        AuditLogger::spawn(self.events.subscribe())
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }
}
