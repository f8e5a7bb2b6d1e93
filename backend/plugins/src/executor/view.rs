//! View executor: one rendering surface per open view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use plugdock_core::{HostError, HostEventKind, HostResult, ViewType};
use tracing::info;

use super::{ExecutionHost, ViewHandle};
use crate::platform::ContextKind;

pub struct ViewExecutor {
    host: Arc<ExecutionHost>,
    next_view: AtomicU64,
}

impl ViewExecutor {
    pub fn new(host: Arc<ExecutionHost>) -> Self {
        Self {
            host,
            next_view: AtomicU64::new(0),
        }
    }

    /// Opens a view; its id has the form `{type}-{pluginId}-{n}`.
    pub async fn open(&self, plugin_id: &str, view_type: ViewType) -> HostResult<Arc<ViewHandle>> {
        let registry = &self.host.registry;
        let config = registry
            .config(plugin_id)
            .ok_or_else(|| HostError::NotRegistered(plugin_id.to_string()))?;
        if !registry.is_approved(plugin_id) {
            return Err(HostError::NotApproved(plugin_id.to_string()));
        }
        let entry = config.view_entry(view_type).ok_or_else(|| {
            HostError::execution(plugin_id, format!("plugin declares no {view_type} view"))
        })?;

        let n = self.next_view.fetch_add(1, Ordering::SeqCst) + 1;
        let view_id = format!("{view_type}-{plugin_id}-{n}");
        let kind = ContextKind::Surface {
            view_id: view_id.clone(),
            view_type,
        };
        let execution = Arc::new(self.host.launch(plugin_id, entry, kind).await?);
        let view = Arc::new(ViewHandle::new(view_id.clone(), view_type, execution.clone()));

        if let Err(e) = registry.add_view(plugin_id, view.clone()) {
            self.host.teardown(&execution).await;
            return Err(e);
        }
        let watched_id = view_id.clone();
        self.host.watch(&execution, move |registry, handle| {
            registry.remove_view(handle.plugin_id(), &watched_id).is_some()
        });

        if let Err(e) = self.host.initialize(&execution).await {
            registry.remove_view(plugin_id, &view_id);
            self.host.teardown(&execution).await;
            self.host.report(plugin_id, &e);
            return Err(e);
        }

        info!(plugin = %plugin_id, view = %view_id, "View opened");
        self.host.events.emit(
            plugin_id,
            HostEventKind::ViewOpened {
                view_id,
                view_type,
            },
        );
        Ok(view)
    }

    /// Returns false if the view is not open.
    pub async fn close(&self, plugin_id: &str, view_id: &str) -> bool {
        let Some(view) = self.host.registry.remove_view(plugin_id, view_id) else {
            return false;
        };
        self.teardown(plugin_id, &view).await;
        true
    }

    /// Closes every open view of the plugin; returns how many were open.
    pub async fn close_all(&self, plugin_id: &str) -> usize {
        let views = self.host.registry.take_views(plugin_id);
        for view in &views {
            self.teardown(plugin_id, view).await;
        }
        views.len()
    }

    async fn teardown(&self, plugin_id: &str, view: &ViewHandle) {
        self.host.teardown(view.execution()).await;
        info!(plugin = %plugin_id, view = %view.view_id(), "View closed");
        self.host.events.emit(
            plugin_id,
            HostEventKind::ViewClosed {
                view_id: view.view_id().to_string(),
            },
        );
    }
}
