//! Config defaults: fills unset values after parsing.

use crate::schema::{EventsConfig, HostConfig, LoggingConfig, RpcConfig, TimeoutsConfig};

/// Default bound on a context's `initialize()`.
pub const DEFAULT_INITIALIZE_MS: u64 = 10_000;

/// Default bound on a context's `terminate()` before forced teardown.
pub const DEFAULT_TERMINATE_MS: u64 = 3_000;

/// Default wait for a view surface's load signal.
pub const DEFAULT_SURFACE_LOAD_MS: u64 = 10_000;

/// Default bound on any other RPC call into a context.
pub const DEFAULT_RPC_CALL_MS: u64 = 30_000;

pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: HostConfig) -> HostConfig {
    let config = apply_timeout_defaults(config);
    let config = apply_rpc_defaults(config);
    let config = apply_event_defaults(config);
    apply_logging_defaults(config)
}

/// Unset or zero timeouts fall back to the defaults.
fn apply_timeout_defaults(mut config: HostConfig) -> HostConfig {
    let timeouts = config.timeouts.get_or_insert_with(TimeoutsConfig::default);
    fill(&mut timeouts.initialize_ms, DEFAULT_INITIALIZE_MS);
    fill(&mut timeouts.terminate_ms, DEFAULT_TERMINATE_MS);
    fill(&mut timeouts.surface_load_ms, DEFAULT_SURFACE_LOAD_MS);
    fill(&mut timeouts.rpc_call_ms, DEFAULT_RPC_CALL_MS);
    config
}

fn apply_rpc_defaults(mut config: HostConfig) -> HostConfig {
    let rpc = config.rpc.get_or_insert_with(RpcConfig::default);
    if rpc.channel_buffer.unwrap_or(0) == 0 {
        rpc.channel_buffer = Some(DEFAULT_CHANNEL_BUFFER);
    }
    config
}

fn apply_event_defaults(mut config: HostConfig) -> HostConfig {
    let events = config.events.get_or_insert_with(EventsConfig::default);
    if events.capacity.unwrap_or(0) == 0 {
        events.capacity = Some(DEFAULT_EVENT_CAPACITY);
    }
    config
}

fn apply_logging_defaults(mut config: HostConfig) -> HostConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    if logging.level.is_none() {
        logging.level = Some(DEFAULT_LOG_LEVEL.to_string());
    }
    if logging.json.is_none() {
        logging.json = Some(false);
    }
    config
}

fn fill(slot: &mut Option<u64>, default: u64) {
    if slot.unwrap_or(0) == 0 {
        *slot = Some(default);
    }
}
