//! Plugin Audit Logger
//!
//! Every host event (approvals, denials, crashes, dropped messages) is written
//! as a structured record under the `plugin_audit` target.

use chrono::{DateTime, Utc};
use plugdock_core::{HostEvent, HostEventKind};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
pub struct AuditLogEntry {
    pub plugin_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub failure: bool,
    pub detail: serde_json::Value,
}

impl AuditLogEntry {
    /// Build a redacted entry from a host event.
    pub fn from_event(event: &HostEvent) -> Self {
        let mut kind = event.kind.clone();
        match &mut kind {
            HostEventKind::LoadFailed { error }
            | HostEventKind::ExecutionFailed { error }
            | HostEventKind::DeliveryFailed { error, .. } => {
                *error = redact_sensitive_data(error);
            }
            HostEventKind::MessageDropped { reason }
            | HostEventKind::BackgroundStopped { reason }
            | HostEventKind::Unregistered { reason } => {
                *reason = redact_sensitive_data(reason);
            }
            _ => {}
        }

        let detail = serde_json::to_value(&kind).unwrap_or(serde_json::Value::Null);
        Self {
            plugin_id: event.plugin_id.clone(),
            timestamp: event.timestamp,
            kind: event.kind.to_string(),
            failure: event.is_failure(),
            detail,
        }
    }
}

pub struct AuditLogger;

impl AuditLogger {
    /// Writes one host event to the audit target.
    pub fn log_event(event: &HostEvent) {
        let entry = AuditLogEntry::from_event(event);
        let detail = entry.detail.to_string();
        if entry.failure {
            warn!(target: "plugin_audit", plugin = %entry.plugin_id, kind = %entry.kind, detail = %detail, "Plugin failure");
        } else {
            info!(target: "plugin_audit", plugin = %entry.plugin_id, kind = %entry.kind, detail = %detail, "Plugin event");
        }
    }

    /// Drains `events` until the host's event bus is dropped.
    pub fn spawn(mut events: broadcast::Receiver<HostEvent>) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut written = 0u64;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        Self::log_event(&event);
                        written += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "plugin_audit", skipped, "Audit logger lagged behind host events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            written
        })
    }
}
