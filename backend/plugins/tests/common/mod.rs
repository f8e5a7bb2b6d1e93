#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use plugdock_config::{HostConfig, TimeoutsConfig};
use plugdock_core::{CapabilitySet, PluginConfig, StorageCapabilities, ViewType};
use plugdock_plugins::{
    CapabilityApi, ContextEnv, ContextHandler, HostServices, InProcessPlatform, PluginComponent,
    PluginManager, StaticLoader,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Entry {
    /// `{pluginId}/{component}`
    pub component: String,
    pub event: String,
    pub data: Value,
}

#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<Entry>>,
}

impl Journal {
    pub fn record(&self, component: String, event: impl Into<String>, data: Value) {
        self.entries.lock().push(Entry {
            component,
            event: event.into(),
            data,
        });
    }

    pub fn events_for(&self, component: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.component == component)
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn find(&self, component: &str, event: &str) -> Option<Entry> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.component == component && e.event == event)
            .cloned()
    }

    pub fn count(&self, event: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.event == event).count()
    }
}

/// Polls `cond` for up to two seconds.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[derive(Clone, Copy)]
pub enum Behavior {
    Normal,
    FailInitialize,
    HangTerminate,
}

pub struct TestComponent {
    env: ContextEnv,
    journal: Arc<Journal>,
    behavior: Behavior,
}

impl TestComponent {
    fn key(&self) -> String {
        format!("{}/{}", self.env.plugin_id(), self.env.handle().component())
    }

    fn api(&self) -> anyhow::Result<&CapabilityApi> {
        match self.env.api() {
            Some(api) => Ok(api),
            None => bail!("no api injected"),
        }
    }
}

#[async_trait]
impl PluginComponent for TestComponent {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.journal.record(self.key(), "initialize", Value::Null);
        if let Behavior::FailInitialize = self.behavior {
            bail!("initialize exploded");
        }
        Ok(())
    }

    async fn terminate(&self) -> anyhow::Result<()> {
        self.journal.record(self.key(), "terminate", Value::Null);
        if let Behavior::HangTerminate = self.behavior {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn get_status(&self) -> anyhow::Result<Value> {
        Ok(json!({ "component": self.env.handle().component(), "ok": true }))
    }

    async fn handle_message(&self, topic: &str, message: Value) -> anyhow::Result<Value> {
        self.journal
            .record(self.key(), format!("message:{topic}"), message.clone());
        let payload = &message["payload"];
        match topic {
            "storage.set" => {
                let key = payload["key"].as_str().unwrap_or_default();
                self.api()?.storage().set(key, &payload["value"]).await?;
                Ok(Value::Null)
            }
            "storage.get" => {
                let key = payload["key"].as_str().unwrap_or_default();
                let value: Option<Value> = self.api()?.storage().get(key).await?;
                Ok(value.unwrap_or(Value::Null))
            }
            _ => Ok(json!({ "ack": topic })),
        }
    }
}

/// Exposes only part of the lifecycle contract.
pub struct PartialHandler;

#[async_trait]
impl ContextHandler for PartialHandler {
    fn methods(&self) -> Vec<String> {
        vec!["initialize".into(), "getStatus".into()]
    }

    async fn call(&self, _method: &str, _params: Value) -> Result<Value, String> {
        Ok(Value::Null)
    }
}

pub struct Harness {
    pub manager: PluginManager,
    pub platform: Arc<InProcessPlatform>,
    pub journal: Arc<Journal>,
    pub envs: Arc<Mutex<Vec<ContextEnv>>>,
}

impl Harness {
    pub fn new(configs: Vec<PluginConfig>) -> Self {
        Self::with_platform(configs, InProcessPlatform::new())
    }

    /// Surfaces take `delay` to load; the host waits at most one second.
    pub fn with_surface_delay(configs: Vec<PluginConfig>, delay: Duration) -> Self {
        Self::with_platform(configs, InProcessPlatform::new().with_surface_delay(delay))
    }

    fn with_platform(configs: Vec<PluginConfig>, platform: InProcessPlatform) -> Self {
        let platform = Arc::new(platform);
        let journal = Arc::new(Journal::default());
        let envs = Arc::new(Mutex::new(Vec::new()));

        for (entry, behavior) in [
            ("bg.js", Behavior::Normal),
            ("summary.html", Behavior::Normal),
            ("expand.html", Behavior::Normal),
            ("bg-fail-init.js", Behavior::FailInitialize),
            ("bg-hang.js", Behavior::HangTerminate),
            ("summary-fail-init.html", Behavior::FailInitialize),
        ] {
            let journal = journal.clone();
            let envs = envs.clone();
            platform.register_component(entry, move |env: ContextEnv| {
                envs.lock().push(env.clone());
                TestComponent {
                    env,
                    journal: journal.clone(),
                    behavior,
                }
            });
        }
        for entry in ["bg-partial.js", "summary-partial.html"] {
            platform.register_handler(entry, |_env: ContextEnv| {
                Arc::new(PartialHandler) as Arc<dyn ContextHandler>
            });
        }

        let config = HostConfig {
            timeouts: Some(TimeoutsConfig {
                initialize_ms: Some(1_000),
                terminate_ms: Some(100),
                surface_load_ms: Some(1_000),
                rpc_call_ms: Some(2_000),
            }),
            ..Default::default()
        };
        let manager = PluginManager::new(
            &config,
            Arc::new(StaticLoader::new(configs)),
            platform.clone(),
            HostServices::default(),
        );

        Self {
            manager,
            platform,
            journal,
            envs,
        }
    }

    /// The capability API injected into `plugin_id`'s `component` context.
    pub fn api_for(&self, plugin_id: &str, component: &str) -> Option<CapabilityApi> {
        self.envs
            .lock()
            .iter()
            .rev()
            .find(|env| env.plugin_id() == plugin_id && env.handle().component() == component)
            .and_then(|env| env.api().cloned())
    }

    pub fn env_for(&self, plugin_id: &str, component: &str) -> Option<ContextEnv> {
        self.envs
            .lock()
            .iter()
            .rev()
            .find(|env| env.plugin_id() == plugin_id && env.handle().component() == component)
            .cloned()
    }

    /// Registers and approves `config`.
    pub fn install(&self, config: PluginConfig) {
        let id = config.id.clone();
        assert!(self.manager.register_plugin(config).unwrap());
        self.manager.approve_plugin(&id).unwrap();
    }
}

pub fn storage(read: bool, write: bool) -> CapabilitySet {
    CapabilitySet {
        storage: Some(StorageCapabilities { read, write }),
        ..CapabilitySet::none()
    }
}

pub fn plugin(id: &str) -> PluginConfig {
    PluginConfig::new(id, id, "1.0.0")
        .with_background("bg.js")
        .with_view(ViewType::Summary, "summary.html")
        .with_view(ViewType::Expand, "expand.html")
}
