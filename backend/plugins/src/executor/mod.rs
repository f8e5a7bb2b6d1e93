//! Execution Host
//!
//! Creates and destroys isolated execution contexts: one per background
//! process and one per open view. Every context gets its own capability API
//! and RPC channel, must expose the lifecycle contract, and is torn down
//! terminate-then-destroy with a bounded terminate.

mod background;
mod handle;
mod view;

use std::sync::{Arc, Weak};

use plugdock_config::TimeoutsConfig;
use plugdock_core::{HostError, HostEventKind, HostResult};
use tracing::{debug, error, warn};

use crate::api::ApiFactory;
use crate::contract;
use crate::event_bus::EventBus;
use crate::platform::{ContextHandle, ContextKind, ContextSpec, ExecutionPlatform};
use crate::registry::PluginRegistry;
use crate::rpc::RpcProxy;

pub use background::BackgroundExecutor;
pub use handle::{ExecutionHandle, ViewHandle};
pub use view::ViewExecutor;

/// Services shared by the background and view executors.
pub struct ExecutionHost {
    registry: Arc<PluginRegistry>,
    platform: Arc<dyn ExecutionPlatform>,
    api_factory: Arc<ApiFactory>,
    events: EventBus,
    timeouts: TimeoutsConfig,
    channel_buffer: usize,
}

impl ExecutionHost {
    pub fn new(
        registry: Arc<PluginRegistry>,
        platform: Arc<dyn ExecutionPlatform>,
        api_factory: Arc<ApiFactory>,
        events: EventBus,
        timeouts: TimeoutsConfig,
        channel_buffer: usize,
    ) -> Self {
        Self {
            registry,
            platform,
            api_factory,
            events,
            timeouts,
            channel_buffer,
        }
    }

    /// Creates a context, wires it up and checks the contract. The context is
    /// destroyed again on any failure.
    async fn launch(&self, plugin_id: &str, entry: &str, kind: ContextKind) -> HostResult<ExecutionHandle> {
        let spec = ContextSpec {
            plugin_id: plugin_id.to_string(),
            entry_point: entry.to_string(),
            kind,
        };
        let context = match self.platform.create_context(spec).await {
            Ok(context) => context,
            Err(e) => {
                self.report(plugin_id, &e);
                return Err(e);
            }
        };
        match self.connect(&context).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.platform.destroy(&context).await;
                self.report(plugin_id, &e);
                Err(e)
            }
        }
    }

    async fn connect(&self, context: &ContextHandle) -> HostResult<ExecutionHandle> {
        let plugin_id = context.plugin_id.as_str();
        if context.is_surface() {
            let limit = self.timeouts.surface_load();
            tokio::time::timeout(limit, self.platform.surface_loaded(context))
                .await
                .map_err(|_| HostError::execution(plugin_id, format!("surface did not load within {limit:?}")))??;
        }

        let api = self.api_factory.build(plugin_id, context.component());
        self.platform.inject_api(context, api).await?;
        let transport = self
            .platform
            .establish_channel(context, self.channel_buffer)
            .await?;
        let proxy = RpcProxy::new(transport, self.timeouts.rpc_call());

        let exposed = match proxy.describe().await {
            Ok(methods) => methods,
            Err(e) => {
                proxy.close();
                return Err(HostError::execution(plugin_id, format!("could not list context methods: {e}")));
            }
        };
        let missing = contract::missing_methods(&exposed);
        if !missing.is_empty() {
            proxy.close();
            return Err(HostError::ContractViolation {
                plugin_id: plugin_id.to_string(),
                missing,
            });
        }
        debug!(plugin = %plugin_id, context = %context.id, "Context passed contract check");
        Ok(ExecutionHandle::new(context.clone(), proxy))
    }

    async fn initialize(&self, handle: &ExecutionHandle) -> HostResult<()> {
        handle.initialize(self.timeouts.initialize()).await
    }

    /// Terminate (bounded) then destroy, whatever terminate did.
    async fn teardown(&self, handle: &ExecutionHandle) {
        if !handle.mark_stopping() {
            debug!(plugin = %handle.plugin_id(), "Context already being torn down");
        }
        if handle.is_alive() {
            if let Err(e) = handle.terminate(self.timeouts.terminate()).await {
                warn!(plugin = %handle.plugin_id(), context = %handle.context().id, error = %e, "Terminate failed; destroying context anyway");
            }
        }
        handle.close();
        self.platform.destroy(handle.context()).await;
    }

    fn report(&self, plugin_id: &str, err: &HostError) {
        error!(plugin = %plugin_id, error = %err, "Execution context failed");
        let kind = match err {
            HostError::ContractViolation { missing, .. } => HostEventKind::ContractViolation {
                missing: missing.clone(),
            },
            other => HostEventKind::ExecutionFailed {
                error: other.to_string(),
            },
        };
        self.events.emit(plugin_id, kind);
    }

    /// Cleans up after a context that exits on its own. `detach` removes the
    /// handle from the registry and reports whether it was still there.
    fn watch<F>(self: &Arc<Self>, handle: &Arc<ExecutionHandle>, detach: F)
    where
        F: FnOnce(&PluginRegistry, &Arc<ExecutionHandle>) -> bool + Send + 'static,
    {
        let host: Weak<Self> = Arc::downgrade(self);
        let watched = Arc::downgrade(handle);
        let mut closed = handle.closed_signal();
        tokio::spawn(async move {
            // An Err here means the proxy was closed by the host.
            if closed.wait_for(|c| *c).await.is_err() {
                return;
            }
            let (Some(host), Some(handle)) = (host.upgrade(), watched.upgrade()) else {
                return;
            };
            if handle.is_stopping() || !detach(&host.registry, &handle) {
                return;
            }
            handle.mark_stopping();
            let err = HostError::execution(handle.plugin_id(), "context exited unexpectedly");
            host.report(handle.plugin_id(), &err);
            handle.close();
            host.platform.destroy(handle.context()).await;
        });
    }
}
