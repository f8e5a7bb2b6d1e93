//! In-process execution platform.
//!
//! Runs plugin components as tokio tasks inside the host process, each behind
//! its own RPC channel. Components are registered per entry point ahead of
//! time. Used by embedders without a real sandbox and by the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use plugdock_core::{HostError, HostResult};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::CapabilityApi;
use crate::contract::{ContractAdapter, PluginComponent};
use crate::platform::{ContextHandle, ContextSpec, ExecutionPlatform, InboundFrame};
use crate::rpc::{self, ContextHandler, RpcTransport};

/// Builds the handler for a freshly created context.
pub trait ComponentLauncher: Send + Sync {
    fn launch(&self, env: ContextEnv) -> Arc<dyn ContextHandler>;
}

impl<F> ComponentLauncher for F
where
    F: Fn(ContextEnv) -> Arc<dyn ContextHandler> + Send + Sync,
{
    fn launch(&self, env: ContextEnv) -> Arc<dyn ContextHandler> {
        self(env)
    }
}

/// What a component sees of its surroundings.
#[derive(Clone)]
pub struct ContextEnv {
    handle: ContextHandle,
    api: Arc<OnceCell<CapabilityApi>>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
}

impl ContextEnv {
    pub fn handle(&self) -> &ContextHandle {
        &self.handle
    }

    pub fn plugin_id(&self) -> &str {
        &self.handle.plugin_id
    }

    /// The injected capability API. Present before the component is launched.
    pub fn api(&self) -> Option<&CapabilityApi> {
        self.api.get()
    }

    /// Posts a raw message to the host, the way a rendering surface would.
    pub fn post_to_host(&self, raw: Value) -> bool {
        self.inbound
            .send(InboundFrame {
                origin: self.handle.clone(),
                raw,
            })
            .is_ok()
    }
}

struct LiveContext {
    env: ContextEnv,
    launcher: Arc<dyn ComponentLauncher>,
    loaded: Option<oneshot::Receiver<()>>,
    server: Option<JoinHandle<()>>,
}

pub struct InProcessPlatform {
    launchers: RwLock<HashMap<String, Arc<dyn ComponentLauncher>>>,
    contexts: Mutex<HashMap<Uuid, LiveContext>>,
    inbound_tx: mpsc::UnboundedSender<InboundFrame>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundFrame>>>,
    surface_delay: Duration,
    created: AtomicUsize,
}

impl InProcessPlatform {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            launchers: RwLock::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            inbound_tx: tx,
            inbound_rx: Mutex::new(Some(rx)),
            surface_delay: Duration::ZERO,
            created: AtomicUsize::new(0),
        }
    }

    /// Simulated load time for rendering surfaces.
    pub fn with_surface_delay(mut self, delay: Duration) -> Self {
        self.surface_delay = delay;
        self
    }

    pub fn register_handler(&self, entry: impl Into<String>, launcher: impl ComponentLauncher + 'static) {
        self.launchers.write().insert(entry.into(), Arc::new(launcher));
    }

    /// Registers a contract-implementing component for `entry`.
    pub fn register_component<C, F>(&self, entry: impl Into<String>, factory: F)
    where
        C: PluginComponent + 'static,
        F: Fn(ContextEnv) -> C + Send + Sync + 'static,
    {
        self.register_handler(entry, move |env: ContextEnv| {
            ContractAdapter::shared(factory(env))
        });
    }

    /// Messages posted by contexts. Can be taken once.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundFrame>> {
        self.inbound_rx.lock().take()
    }

    /// Simulates a crash: the context's task dies without terminating.
    pub fn kill(&self, handle: &ContextHandle) -> bool {
        let mut contexts = self.contexts.lock();
        match contexts.get_mut(&handle.id).and_then(|c| c.server.take()) {
            Some(server) => {
                server.abort();
                true
            }
            None => false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Total contexts ever created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live_contexts(&self) -> Vec<ContextHandle> {
        self.contexts
            .lock()
            .values()
            .map(|c| c.env.handle.clone())
            .collect()
    }
}

impl Default for InProcessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_context(handle: &ContextHandle) -> HostError {
    HostError::execution(&handle.plugin_id, format!("context {} no longer exists", handle.id))
}

#[async_trait]
impl ExecutionPlatform for InProcessPlatform {
    async fn create_context(&self, spec: ContextSpec) -> HostResult<ContextHandle> {
        let launcher = self
            .launchers
            .read()
            .get(&spec.entry_point)
            .cloned()
            .ok_or_else(|| {
                HostError::execution(
                    &spec.plugin_id,
                    format!("no component registered for entry '{}'", spec.entry_point),
                )
            })?;

        let handle = ContextHandle::new(spec.plugin_id, spec.kind);
        let loaded = if handle.is_surface() {
            let (tx, rx) = oneshot::channel();
            let delay = self.surface_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(());
            });
            Some(rx)
        } else {
            None
        };

        let env = ContextEnv {
            handle: handle.clone(),
            api: Arc::new(OnceCell::new()),
            inbound: self.inbound_tx.clone(),
        };
        self.contexts.lock().insert(
            handle.id,
            LiveContext {
                env,
                launcher,
                loaded,
                server: None,
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        info!(plugin = %handle.plugin_id, context = %handle.id, entry = %spec.entry_point, "Created in-process context");
        Ok(handle)
    }

    async fn surface_loaded(&self, handle: &ContextHandle) -> HostResult<()> {
        let loaded = {
            let mut contexts = self.contexts.lock();
            let ctx = contexts
                .get_mut(&handle.id)
                .ok_or_else(|| missing_context(handle))?;
            ctx.loaded.take()
        };
        match loaded {
            Some(rx) => rx.await.map_err(|_| {
                HostError::execution(&handle.plugin_id, "surface closed before it finished loading")
            }),
            None => Ok(()),
        }
    }

    async fn inject_api(&self, handle: &ContextHandle, api: CapabilityApi) -> HostResult<()> {
        let contexts = self.contexts.lock();
        let ctx = contexts.get(&handle.id).ok_or_else(|| missing_context(handle))?;
        if ctx.env.api.set(api).is_err() {
            debug!(plugin = %handle.plugin_id, context = %handle.id, "API already injected");
        }
        Ok(())
    }

    async fn establish_channel(
        &self,
        handle: &ContextHandle,
        buffer: usize,
    ) -> HostResult<RpcTransport> {
        let (launcher, env) = {
            let contexts = self.contexts.lock();
            let ctx = contexts.get(&handle.id).ok_or_else(|| missing_context(handle))?;
            (ctx.launcher.clone(), ctx.env.clone())
        };

        let (host, context) = rpc::channel_pair(buffer);
        let handler = launcher.launch(env);
        let server = tokio::spawn(rpc::serve(context, handler));

        let mut contexts = self.contexts.lock();
        match contexts.get_mut(&handle.id) {
            Some(ctx) => {
                if let Some(previous) = ctx.server.replace(server) {
                    previous.abort();
                }
                Ok(host)
            }
            None => {
                server.abort();
                Err(missing_context(handle))
            }
        }
    }

    async fn destroy(&self, handle: &ContextHandle) {
        if let Some(ctx) = self.contexts.lock().remove(&handle.id) {
            if let Some(server) = ctx.server {
                server.abort();
            }
            debug!(plugin = %handle.plugin_id, context = %handle.id, "Destroyed in-process context");
        }
    }
}
