pub mod capability;
pub mod error;
pub mod event;
pub mod message;
pub mod types;

pub use capability::{
    Capability, CapabilitySet, NetworkAccess, NetworkCapabilities, StorageAccess,
    StorageCapabilities,
};
pub use error::{HostError, HostResult};
pub use event::{HostEvent, HostEventKind};
pub use message::{MessageTarget, PluginMessage};
pub use types::{EntryDescriptor, PluginConfig, PluginStatus, ViewType};
