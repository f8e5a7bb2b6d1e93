//! Capability API Factory
//!
//! Builds the API object injected into each execution context. The object
//! exposes only capability-scoped operations and re-checks the permission
//! store on every call, so a change of grant applies to the next call.

pub mod boundary;
pub mod messaging;
pub mod network;
pub mod storage;
pub mod ui;

use std::sync::Arc;

use plugdock_core::{Capability, CapabilitySet, HostEventKind, HostResult};
use tracing::debug;

use crate::bus::MessageBus;
use crate::event_bus::EventBus;
use crate::permissions::PermissionStore;

pub use messaging::MessagingApi;
pub use network::{
    HttpApi, HttpRequest, HttpResponse, NetworkApi, NetworkTransport, OfflineTransport,
    ReqwestTransport, SocketApi, SocketHandle, SocketProtocol, SocketStream,
};
pub use storage::{MemoryStorage, StorageApi, StorageBackend};
pub use ui::{NullUiBridge, TabOptions, TabOwnership, UiApi, UiBridge};

/// Adapters the capability APIs call into.
#[derive(Clone)]
pub struct HostServices {
    pub storage: Arc<dyn StorageBackend>,
    pub network: Arc<dyn NetworkTransport>,
    pub ui: Arc<dyn UiBridge>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            network: Arc::new(OfflineTransport),
            ui: Arc::new(NullUiBridge),
        }
    }
}

struct ApiInner {
    plugin_id: String,
    component: String,
    permissions: Arc<PermissionStore>,
    services: HostServices,
    tabs: Arc<TabOwnership>,
    bus: Arc<MessageBus>,
    events: EventBus,
}

/// Capability-scoped API for one context. Cheap to clone.
#[derive(Clone)]
pub struct CapabilityApi {
    inner: Arc<ApiInner>,
}

impl CapabilityApi {
    pub fn plugin_id(&self) -> &str {
        &self.inner.plugin_id
    }

    /// `background` or the view id this API was built for.
    pub fn component(&self) -> &str {
        &self.inner.component
    }

    /// Current grant, read fresh from the permission store.
    pub fn capabilities(&self) -> CapabilitySet {
        self.inner
            .permissions
            .granted(&self.inner.plugin_id)
            .unwrap_or_default()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.inner
            .permissions
            .has_capability(&self.inner.plugin_id, capability)
    }

    pub fn storage(&self) -> StorageApi<'_> {
        StorageApi::new(self)
    }

    pub fn network(&self) -> NetworkApi<'_> {
        NetworkApi::new(self)
    }

    pub fn ui(&self) -> UiApi<'_> {
        UiApi::new(self)
    }

    pub fn messaging(&self) -> MessagingApi<'_> {
        MessagingApi::new(self)
    }

    pub(crate) fn require(&self, capability: Capability, operation: &str) -> HostResult<()> {
        let result = self
            .inner
            .permissions
            .assert_capability(&self.inner.plugin_id, capability, operation);
        if result.is_err() {
            self.emit(HostEventKind::PermissionDenied {
                capability: capability.to_string(),
                operation: operation.to_string(),
            });
        }
        result
    }

    pub(crate) fn is_approved(&self) -> bool {
        self.inner.permissions.is_approved(&self.inner.plugin_id)
    }

    pub(crate) fn emit(&self, kind: HostEventKind) {
        self.inner.events.emit(&self.inner.plugin_id, kind);
    }

    pub(crate) fn storage_backend(&self) -> &dyn StorageBackend {
        self.inner.services.storage.as_ref()
    }

    pub(crate) fn network_transport(&self) -> &dyn NetworkTransport {
        self.inner.services.network.as_ref()
    }

    pub(crate) fn ui_bridge(&self) -> &dyn UiBridge {
        self.inner.services.ui.as_ref()
    }

    pub(crate) fn tabs(&self) -> &TabOwnership {
        &self.inner.tabs
    }

    pub(crate) fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }
}

pub struct ApiFactory {
    permissions: Arc<PermissionStore>,
    services: HostServices,
    tabs: Arc<TabOwnership>,
    bus: Arc<MessageBus>,
    events: EventBus,
}

impl ApiFactory {
    pub fn new(
        permissions: Arc<PermissionStore>,
        services: HostServices,
        bus: Arc<MessageBus>,
        events: EventBus,
    ) -> Self {
        Self {
            permissions,
            services,
            tabs: Arc::new(TabOwnership::default()),
            bus,
            events,
        }
    }

    pub fn build(&self, plugin_id: &str, component: &str) -> CapabilityApi {
        debug!(plugin = %plugin_id, component = %component, "Building capability api");
        CapabilityApi {
            inner: Arc::new(ApiInner {
                plugin_id: plugin_id.to_string(),
                component: component.to_string(),
                permissions: self.permissions.clone(),
                services: self.services.clone(),
                tabs: self.tabs.clone(),
                bus: self.bus.clone(),
                events: self.events.clone(),
            }),
        }
    }

    /// Closes every tab a plugin still owns. Used when it is unregistered.
    pub async fn release_tabs(&self, plugin_id: &str) -> usize {
        let tabs = self.tabs.release_all(plugin_id);
        for tab in &tabs {
            if let Err(e) = self.services.ui.close_tab(tab).await {
                debug!(plugin = %plugin_id, tab = %tab, error = %e, "Failed to close plugin tab");
            }
        }
        tabs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use plugdock_core::{
        HostError, NetworkCapabilities, PluginConfig, StorageCapabilities,
    };
    use serde_json::{json, Value};

    struct Fixture {
        registry: Arc<PluginRegistry>,
        factory: ApiFactory,
        events: EventBus,
    }

    fn fixture(services: HostServices) -> Fixture {
        let permissions = Arc::new(PermissionStore::new());
        let registry = Arc::new(PluginRegistry::new(permissions.clone()));
        let events = EventBus::new();
        let bus = Arc::new(MessageBus::new(registry.clone(), events.clone()));
        let factory = ApiFactory::new(permissions, services, bus, events.clone());
        Fixture {
            registry,
            factory,
            events,
        }
    }

    fn caps(read: bool, write: bool, dom: bool, websocket: bool) -> CapabilitySet {
        CapabilitySet {
            storage: Some(StorageCapabilities { read, write }),
            network: Some(NetworkCapabilities {
                websocket,
                ..Default::default()
            }),
            dom,
            ..CapabilitySet::none()
        }
    }

    fn register(fx: &Fixture, id: &str, requested: CapabilitySet) {
        assert!(fx
            .registry
            .register(PluginConfig::new(id, id, "1.0.0").with_capabilities(requested)));
    }

    #[tokio::test]
    async fn test_identity_accessors() {
        let fx = fixture(HostServices::default());
        let api = fx.factory.build("p1", "background");
        assert_eq!(api.plugin_id(), "p1");
        assert_eq!(api.component(), "background");
        assert!(api.capabilities().is_empty());
    }

    #[tokio::test]
    async fn test_storage_follows_current_grant() {
        let fx = fixture(HostServices::default());
        register(&fx, "p1", caps(true, true, false, false));
        let api = fx.factory.build("p1", "background");

        // unapproved: nothing works yet
        assert!(api.storage().get::<String>("k").await.unwrap_err().is_permission_denied());

        fx.registry.approve("p1").unwrap();
        api.storage().set("k", "v").await.unwrap();
        assert_eq!(api.storage().keys().await.unwrap(), vec!["k"]);

        fx.registry
            .reapprove("p1", &caps(true, false, false, false))
            .unwrap();
        let mut events = fx.events.subscribe();
        let err = api.storage().set("k", "w").await.unwrap_err();
        assert!(matches!(err, HostError::PermissionDenied { .. }));
        assert_eq!(
            api.storage().get::<String>("k").await.unwrap().as_deref(),
            Some("v")
        );
        let event = events.recv().await.unwrap();
        assert!(matches!(event.kind, HostEventKind::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_storage_is_namespaced_per_plugin() {
        let fx = fixture(HostServices::default());
        register(&fx, "p1", caps(true, true, false, false));
        register(&fx, "p2", caps(true, true, false, false));
        fx.registry.approve("p1").unwrap();
        fx.registry.approve("p2").unwrap();

        fx.factory.build("p1", "background").storage().set("k", &1).await.unwrap();
        let other = fx.factory.build("p2", "background");
        assert!(other.storage().get::<i64>("k").await.unwrap().is_none());
    }

    #[derive(Default)]
    struct RecordingUi {
        closed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UiBridge for RecordingUi {
        async fn open_tab(&self, _: &str, _: &str, _: &TabOptions) -> anyhow::Result<()> {
            Ok(())
        }

        async fn update_tab(&self, _: &str, _: &TabOptions) -> anyhow::Result<()> {
            Ok(())
        }

        async fn close_tab(&self, tab_id: &str) -> anyhow::Result<()> {
            self.closed.lock().push(tab_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tabs_are_owned_by_opener() {
        let ui = Arc::new(RecordingUi::default());
        let fx = fixture(HostServices {
            ui: ui.clone(),
            ..HostServices::default()
        });
        register(&fx, "p1", caps(false, false, true, false));
        register(&fx, "p2", caps(false, false, true, false));
        fx.registry.approve("p1").unwrap();
        fx.registry.approve("p2").unwrap();

        let p1 = fx.factory.build("p1", "background");
        let p2 = fx.factory.build("p2", "background");
        let tab = p1
            .ui()
            .open_tab(&TabOptions {
                title: "Forecast".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = p2.ui().close_tab(&tab).await.unwrap_err();
        assert!(matches!(err, HostError::TabNotOwned { .. }));
        assert!(err.is_permission_denied());
        assert!(p2.ui().update_tab(&tab, &TabOptions::default()).await.is_err());

        p1.ui().update_tab(&tab, &TabOptions::default()).await.unwrap();
        assert_eq!(fx.factory.release_tabs("p1").await, 1);
        assert_eq!(*ui.closed.lock(), vec![tab]);
    }

    #[tokio::test]
    async fn test_ui_requires_dom() {
        let fx = fixture(HostServices::default());
        register(&fx, "p1", caps(true, false, false, false));
        fx.registry.approve("p1").unwrap();
        let api = fx.factory.build("p1", "background");
        assert!(api.ui().open_tab(&TabOptions::default()).await.is_err());
    }

    struct Loopback {
        frames: Vec<String>,
    }

    #[async_trait]
    impl SocketStream for Loopback {
        async fn send(&mut self, frame: String) -> anyhow::Result<()> {
            self.frames.push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.frames.pop())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.frames.clear();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeNetwork {
        http_calls: Mutex<usize>,
    }

    #[async_trait]
    impl NetworkTransport for FakeNetwork {
        async fn http(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
            *self.http_calls.lock() += 1;
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: request.url,
            })
        }

        async fn connect(
            &self,
            _protocol: SocketProtocol,
            _url: &str,
        ) -> anyhow::Result<Box<dyn SocketStream>> {
            Ok(Box::new(Loopback { frames: Vec::new() }))
        }
    }

    #[tokio::test]
    async fn test_denied_http_never_reaches_transport() {
        let network = Arc::new(FakeNetwork::default());
        let fx = fixture(HostServices {
            network: network.clone(),
            ..HostServices::default()
        });
        register(&fx, "p1", caps(false, false, false, true));
        fx.registry.approve("p1").unwrap();
        let api = fx.factory.build("p1", "background");

        let request = HttpRequest::get("https://example.com");
        assert!(api.network().http().fetch(&request).await.is_err());
        assert_eq!(*network.http_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_open_socket_rechecks_on_every_send() {
        let fx = fixture(HostServices {
            network: Arc::new(FakeNetwork::default()),
            ..HostServices::default()
        });
        register(&fx, "p1", caps(true, false, false, true));
        fx.registry.approve("p1").unwrap();
        let api = fx.factory.build("p1", "background");

        assert!(api.network().socketio().connect("wss://example.com").await.is_err());
        let socket = api
            .network()
            .websocket()
            .connect("wss://example.com")
            .await
            .unwrap();
        socket.send(&json!({"hello": 1})).await.unwrap();
        assert_eq!(socket.recv().await.unwrap(), Some(json!({"hello": 1})));

        fx.registry
            .reapprove("p1", &caps(true, false, false, false))
            .unwrap();
        assert!(socket.send(&Value::Null).await.unwrap_err().is_permission_denied());
        assert!(socket.recv().await.is_err());
        socket.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_messaging_requires_approval() {
        let fx = fixture(HostServices::default());
        register(&fx, "p1", CapabilitySet::none());
        let api = fx.factory.build("p1", "background");
        let err = api
            .messaging()
            .send(plugdock_core::MessageTarget::AllViews, "ping", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::NotApproved(_)));

        fx.registry.approve("p1").unwrap();
        let err = api
            .messaging()
            .send(plugdock_core::MessageTarget::AllViews, "ping", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Delivery(_)));
    }
}
