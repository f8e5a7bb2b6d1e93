//! Lifecycle contract every execution context implements.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::rpc::ContextHandler;

pub const INITIALIZE: &str = "initialize";
pub const TERMINATE: &str = "terminate";
pub const GET_STATUS: &str = "getStatus";
pub const HANDLE_MESSAGE: &str = "handleMessage";

pub const CONTRACT_METHODS: [&str; 4] = [INITIALIZE, TERMINATE, GET_STATUS, HANDLE_MESSAGE];

/// Contract methods absent from `exposed`, in contract order.
pub fn missing_methods(exposed: &[String]) -> Vec<String> {
    CONTRACT_METHODS
        .iter()
        .filter(|m| !exposed.iter().any(|e| e.as_str() == **m))
        .map(|m| m.to_string())
        .collect()
}

/// Plugin-side component: a background process or a view.
#[async_trait]
pub trait PluginComponent: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()>;

    async fn terminate(&self) -> anyhow::Result<()>;

    async fn get_status(&self) -> anyhow::Result<Value> {
        Ok(json!({ "state": "running" }))
    }

    async fn handle_message(&self, topic: &str, message: Value) -> anyhow::Result<Value>;
}

#[derive(Deserialize)]
struct HandleMessageParams {
    topic: String,
    #[serde(default)]
    message: Value,
}

/// Exposes a [`PluginComponent`] over the RPC channel.
pub struct ContractAdapter<C> {
    component: C,
}

impl<C: PluginComponent + 'static> ContractAdapter<C> {
    pub fn new(component: C) -> Self {
        Self { component }
    }

    pub fn shared(component: C) -> Arc<dyn ContextHandler> {
        Arc::new(Self::new(component))
    }
}

#[async_trait]
impl<C: PluginComponent + 'static> ContextHandler for ContractAdapter<C> {
    fn methods(&self) -> Vec<String> {
        CONTRACT_METHODS.iter().map(|m| m.to_string()).collect()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        let outcome = match method {
            INITIALIZE => self.component.initialize().await.map(|_| Value::Null),
            TERMINATE => self.component.terminate().await.map(|_| Value::Null),
            GET_STATUS => self.component.get_status().await,
            HANDLE_MESSAGE => {
                let params: HandleMessageParams = serde_json::from_value(params)
                    .map_err(|e| format!("invalid handleMessage params: {e}"))?;
                self.component
                    .handle_message(&params.topic, params.message)
                    .await
            }
            other => return Err(format!("unknown method '{other}'")),
        };
        outcome.map_err(|e| format!("{e:#}"))
    }
}

/// Parameters for a `handleMessage` call or notification.
pub fn handle_message_params(topic: &str, message: Value) -> Value {
    json!({ "topic": topic, "message": message })
}
