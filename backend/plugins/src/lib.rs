pub mod api;
pub mod bus;
pub mod contract;
pub mod event_bus;
pub mod executor;
pub mod in_process;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod permissions;
pub mod platform;
pub mod registry;
pub mod rpc;

pub use api::{ApiFactory, CapabilityApi, HostServices};
pub use bus::{BusError, MessageBus};
pub use contract::{ContractAdapter, PluginComponent};
pub use event_bus::EventBus;
pub use executor::{BackgroundExecutor, ExecutionHandle, ExecutionHost, ViewExecutor, ViewHandle};
pub use in_process::{ComponentLauncher, ContextEnv, InProcessPlatform};
pub use lifecycle::PluginState;
pub use loader::{DirectoryLoader, PluginLoader, StaticLoader};
pub use manager::PluginManager;
pub use permissions::PermissionStore;
pub use platform::{ContextHandle, ContextKind, ContextSpec, ExecutionPlatform, InboundFrame};
pub use registry::{PluginRegistry, RegisteredPlugin};
pub use rpc::{ContextHandler, RpcEnvelope, RpcError, RpcProxy, RpcTransport};
