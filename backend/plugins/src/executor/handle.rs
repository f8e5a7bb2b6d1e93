//! Handles to live execution contexts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use plugdock_core::{HostError, HostResult, ViewType};
use serde_json::Value;
use tokio::sync::watch;

use crate::contract::{self, handle_message_params};
use crate::platform::ContextHandle;
use crate::rpc::{RpcError, RpcProxy};

/// One isolated context plus the proxy used to drive it.
pub struct ExecutionHandle {
    context: ContextHandle,
    proxy: RpcProxy,
    started_at: DateTime<Utc>,
    stopping: AtomicBool,
}

impl ExecutionHandle {
    pub(crate) fn new(context: ContextHandle, proxy: RpcProxy) -> Self {
        Self {
            context,
            proxy,
            started_at: Utc::now(),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.context.plugin_id
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// False once the context has exited or been torn down.
    pub fn is_alive(&self) -> bool {
        !self.proxy.is_closed()
    }

    pub(crate) async fn initialize(&self, limit: Duration) -> HostResult<()> {
        self.proxy
            .call_with_timeout(contract::INITIALIZE, Value::Null, limit)
            .await
            .map(|_| ())
            .map_err(|e| HostError::execution(self.plugin_id(), format!("initialize failed: {e}")))
    }

    pub(crate) async fn terminate(&self, limit: Duration) -> Result<(), RpcError> {
        self.proxy
            .call_with_timeout(contract::TERMINATE, Value::Null, limit)
            .await
            .map(|_| ())
    }

    pub async fn get_status(&self) -> HostResult<Value> {
        Ok(self.proxy.call(contract::GET_STATUS, Value::Null).await?)
    }

    /// Awaited delivery; returns the component's reply.
    pub async fn handle_message(&self, topic: &str, message: Value) -> HostResult<Value> {
        Ok(self
            .proxy
            .call(contract::HANDLE_MESSAGE, handle_message_params(topic, message))
            .await?)
    }

    /// One-way delivery.
    pub async fn post_message(&self, topic: &str, message: Value) -> HostResult<()> {
        Ok(self
            .proxy
            .notify(contract::HANDLE_MESSAGE, handle_message_params(topic, message))
            .await?)
    }

    /// Marks the handle as being torn down on purpose. Returns false if it
    /// already was.
    pub(crate) fn mark_stopping(&self) -> bool {
        !self.stopping.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.proxy.close();
    }

    pub(crate) fn closed_signal(&self) -> watch::Receiver<bool> {
        self.proxy.closed_signal()
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("context", &self.context)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// A visible view: one rendering surface and its execution handle.
#[derive(Debug)]
pub struct ViewHandle {
    view_id: String,
    view_type: ViewType,
    execution: Arc<ExecutionHandle>,
}

impl ViewHandle {
    pub(crate) fn new(view_id: String, view_type: ViewType, execution: Arc<ExecutionHandle>) -> Self {
        Self {
            view_id,
            view_type,
            execution,
        }
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    pub fn view_type(&self) -> ViewType {
        self.view_type
    }

    pub fn execution(&self) -> &Arc<ExecutionHandle> {
        &self.execution
    }
}
