//! Execution platform seam.
//!
//! The host never runs plugin code itself. It asks an [`ExecutionPlatform`]
//! for isolated contexts and talks to them only through the RPC channel the
//! platform establishes.

use async_trait::async_trait;
use plugdock_core::{HostResult, ViewType};
use serde_json::Value;
use uuid::Uuid;

use crate::api::CapabilityApi;
use crate::rpc::RpcTransport;

/// Component name used for a plugin's background context.
pub const BACKGROUND_COMPONENT: &str = "background";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Headless worker for the background process.
    Worker,
    /// Rendering surface for a visible view.
    Surface { view_id: String, view_type: ViewType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle {
    pub id: Uuid,
    pub plugin_id: String,
    pub kind: ContextKind,
}

impl ContextHandle {
    pub fn new(plugin_id: impl Into<String>, kind: ContextKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_id: plugin_id.into(),
            kind,
        }
    }

    /// `background` or the view id; used as a message `source`.
    pub fn component(&self) -> &str {
        match &self.kind {
            ContextKind::Worker => BACKGROUND_COMPONENT,
            ContextKind::Surface { view_id, .. } => view_id,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self.kind, ContextKind::Surface { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ContextSpec {
    pub plugin_id: String,
    pub entry_point: String,
    pub kind: ContextKind,
}

/// Raw message posted by a context to the host, outside the RPC channel.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub origin: ContextHandle,
    pub raw: Value,
}

#[async_trait]
pub trait ExecutionPlatform: Send + Sync {
    async fn create_context(&self, spec: ContextSpec) -> HostResult<ContextHandle>;

    /// Resolves once a surface has finished loading. Workers resolve at once.
    async fn surface_loaded(&self, handle: &ContextHandle) -> HostResult<()>;

    async fn inject_api(&self, handle: &ContextHandle, api: CapabilityApi) -> HostResult<()>;

    async fn establish_channel(&self, handle: &ContextHandle, buffer: usize)
        -> HostResult<RpcTransport>;

    /// Tears the context down. Must be safe to call more than once.
    async fn destroy(&self, handle: &ContextHandle);
}
