//! Event Bus
//!
//! Broadcasts per-plugin host events (load failures, denials, crashes) to the
//! host UI and the audit logger.

use plugdock_core::{HostEvent, HostEventKind};
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HostEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { sender: tx }
    }

    /// Dispatches an event to every subscriber. Having none is fine.
    pub fn publish(&self, event: HostEvent) {
        debug!(plugin = %event.plugin_id, kind = %event.kind, "Publishing host event");
        let _ = self.sender.send(event);
    }

    pub fn emit(&self, plugin_id: &str, kind: HostEventKind) {
        self.publish(HostEvent::new(plugin_id, kind));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit("p1", HostEventKind::Registered);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.plugin_id, "p1");
        assert_eq!(event.kind, HostEventKind::Registered);
    }

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::with_capacity(0).emit("p1", HostEventKind::Revoked);
    }
}
