//! Capability taxonomy.
//!
//! A plugin carries two [`CapabilitySet`]s: the set it *requested* in its
//! configuration and the set the host *granted* at approval time. Only the
//! granted set is ever consulted when a call is checked.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Network sub-capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCapabilities {
    pub http: bool,
    pub websocket: bool,
    pub socketio: bool,
}

impl NetworkCapabilities {
    fn intersect(&self, other: &Self) -> Self {
        Self {
            http: self.http && other.http,
            websocket: self.websocket && other.websocket,
            socketio: self.socketio && other.socketio,
        }
    }

    fn any(&self) -> bool {
        self.http || self.websocket || self.socketio
    }
}

/// Storage sub-capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageCapabilities {
    pub read: bool,
    pub write: bool,
}

impl StorageCapabilities {
    fn intersect(&self, other: &Self) -> Self {
        Self {
            read: self.read && other.read,
            write: self.write && other.write,
        }
    }

    fn any(&self) -> bool {
        self.read || self.write
    }
}

/// A set of capabilities drawn from the fixed taxonomy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageCapabilities>,
    pub dom: bool,
    pub file: bool,
    pub system: bool,
}

impl CapabilitySet {
    /// The empty set. Every plugin's granted set starts here.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether `capability` is allowed by this set.
    ///
    /// A bare resource (`Network(None)`, `Storage(None)`) is allowed when any
    /// of its sub-capabilities is.
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Network(sub) => match (self.network, sub) {
                (None, _) => false,
                (Some(net), None) => net.any(),
                (Some(net), Some(NetworkAccess::Http)) => net.http,
                (Some(net), Some(NetworkAccess::WebSocket)) => net.websocket,
                (Some(net), Some(NetworkAccess::SocketIo)) => net.socketio,
            },
            Capability::Storage(sub) => match (self.storage, sub) {
                (None, _) => false,
                (Some(st), None) => st.any(),
                (Some(st), Some(StorageAccess::Read)) => st.read,
                (Some(st), Some(StorageAccess::Write)) => st.write,
            },
            Capability::Dom => self.dom,
            Capability::File => self.file,
            Capability::System => self.system,
        }
    }

    /// Capabilities present in both sets.
    ///
    /// Resources whose sub-flags all end up false are dropped entirely.
    pub fn intersect(&self, other: &Self) -> Self {
        let network = match (self.network, other.network) {
            (Some(a), Some(b)) => Some(a.intersect(&b)).filter(NetworkCapabilities::any),
            _ => None,
        };
        let storage = match (self.storage, other.storage) {
            (Some(a), Some(b)) => Some(a.intersect(&b)).filter(StorageCapabilities::any),
            _ => None,
        };
        Self {
            network,
            storage,
            dom: self.dom && other.dom,
            file: self.file && other.file,
            system: self.system && other.system,
        }
    }

    /// True when every capability allowed here is also allowed by `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        Capability::ALL
            .iter()
            .all(|cap| !self.allows(*cap) || other.allows(*cap))
    }

    pub fn is_empty(&self) -> bool {
        !Capability::ALL.iter().any(|cap| self.allows(*cap))
    }

    /// Every leaf capability allowed by this set.
    pub fn allowed(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|cap| cap.is_leaf() && self.allows(*cap))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkAccess {
    Http,
    WebSocket,
    SocketIo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    Read,
    Write,
}

/// A `(resource, sub-resource?)` pair checked by the permission store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Network(Option<NetworkAccess>),
    Storage(Option<StorageAccess>),
    Dom,
    File,
    System,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::Network(None),
        Capability::Network(Some(NetworkAccess::Http)),
        Capability::Network(Some(NetworkAccess::WebSocket)),
        Capability::Network(Some(NetworkAccess::SocketIo)),
        Capability::Storage(None),
        Capability::Storage(Some(StorageAccess::Read)),
        Capability::Storage(Some(StorageAccess::Write)),
        Capability::Dom,
        Capability::File,
        Capability::System,
    ];

    pub const HTTP: Capability = Capability::Network(Some(NetworkAccess::Http));
    pub const WEBSOCKET: Capability = Capability::Network(Some(NetworkAccess::WebSocket));
    pub const SOCKETIO: Capability = Capability::Network(Some(NetworkAccess::SocketIo));
    pub const STORAGE_READ: Capability = Capability::Storage(Some(StorageAccess::Read));
    pub const STORAGE_WRITE: Capability = Capability::Storage(Some(StorageAccess::Write));

    fn is_leaf(&self) -> bool {
        !matches!(self, Capability::Network(None) | Capability::Storage(None))
    }

    /// Parse `resource` or `resource:sub` (e.g. `storage:write`).
    pub fn parse(input: &str) -> Option<Self> {
        let (resource, sub) = match input.split_once(':') {
            Some((r, s)) => (r, Some(s)),
            None => (input, None),
        };
        match (resource, sub) {
            ("network", None) => Some(Capability::Network(None)),
            ("network", Some("http")) => Some(Self::HTTP),
            ("network", Some("websocket")) => Some(Self::WEBSOCKET),
            ("network", Some("socketio")) => Some(Self::SOCKETIO),
            ("storage", None) => Some(Capability::Storage(None)),
            ("storage", Some("read")) => Some(Self::STORAGE_READ),
            ("storage", Some("write")) => Some(Self::STORAGE_WRITE),
            ("dom", None) => Some(Capability::Dom),
            ("file", None) => Some(Capability::File),
            ("system", None) => Some(Capability::System),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Network(None) => write!(f, "network"),
            Capability::Network(Some(NetworkAccess::Http)) => write!(f, "network:http"),
            Capability::Network(Some(NetworkAccess::WebSocket)) => write!(f, "network:websocket"),
            Capability::Network(Some(NetworkAccess::SocketIo)) => write!(f, "network:socketio"),
            Capability::Storage(None) => write!(f, "storage"),
            Capability::Storage(Some(StorageAccess::Read)) => write!(f, "storage:read"),
            Capability::Storage(Some(StorageAccess::Write)) => write!(f, "storage:write"),
            Capability::Dom => write!(f, "dom"),
            Capability::File => write!(f, "file"),
            Capability::System => write!(f, "system"),
        }
    }
}
