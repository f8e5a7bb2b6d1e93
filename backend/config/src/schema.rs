//! Host configuration schema.
//!
//! Every field is optional on disk; [`crate::defaults::apply_all_defaults`]
//! fills what the file leaves out.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults::{
    DEFAULT_CHANNEL_BUFFER, DEFAULT_EVENT_CAPACITY, DEFAULT_INITIALIZE_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_RPC_CALL_MS, DEFAULT_SURFACE_LOAD_MS, DEFAULT_TERMINATE_MS,
};

/// Root configuration for the plugin host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Directory scanned by the directory loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<RpcConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<EventsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Bounds on calls into execution contexts, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialize_ms: Option<u64>,
    /// Upper bound on `terminate()` before the context is destroyed anyway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_ms: Option<u64>,
    /// How long a view surface may take to signal that it loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_load_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_call_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    /// Frames buffered per direction on a context channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_buffer: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /// Broadcast capacity of the host event bus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// When set, NDJSON logs also roll daily into this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl HostConfig {
    pub fn timeouts(&self) -> TimeoutsConfig {
        self.timeouts.clone().unwrap_or_default()
    }

    pub fn channel_buffer(&self) -> usize {
        self.rpc
            .as_ref()
            .and_then(|r| r.channel_buffer)
            .unwrap_or(DEFAULT_CHANNEL_BUFFER)
    }

    pub fn event_capacity(&self) -> usize {
        self.events
            .as_ref()
            .and_then(|e| e.capacity)
            .unwrap_or(DEFAULT_EVENT_CAPACITY)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

impl TimeoutsConfig {
    pub fn initialize(&self) -> Duration {
        Duration::from_millis(self.initialize_ms.unwrap_or(DEFAULT_INITIALIZE_MS))
    }

    pub fn terminate(&self) -> Duration {
        Duration::from_millis(self.terminate_ms.unwrap_or(DEFAULT_TERMINATE_MS))
    }

    pub fn surface_load(&self) -> Duration {
        Duration::from_millis(self.surface_load_ms.unwrap_or(DEFAULT_SURFACE_LOAD_MS))
    }

    pub fn rpc_call(&self) -> Duration {
        Duration::from_millis(self.rpc_call_ms.unwrap_or(DEFAULT_RPC_CALL_MS))
    }
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}
