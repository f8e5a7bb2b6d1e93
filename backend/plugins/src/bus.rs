//! Message Bus
//!
//! Routes [`PluginMessage`]s between the components of one plugin. The
//! registry is the only source of live endpoints; a message never leaves the
//! plugin named in it.

use std::sync::Arc;

use plugdock_core::{HostError, HostEventKind, MessageTarget, PluginMessage};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event_bus::EventBus;
use crate::executor::ViewHandle;
use crate::platform::ContextHandle;
use crate::registry::PluginRegistry;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    #[error("no live recipient for target '{target}'")]
    NoRecipients { target: String },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message names plugin '{claimed}' but was sent by '{origin}'")]
    CrossPlugin { claimed: String, origin: String },
    #[error("recipient rejected the message: {0}")]
    Rejected(String),
    #[error("plugin '{0}' is not registered")]
    NotRegistered(String),
}

impl From<BusError> for HostError {
    fn from(err: BusError) -> Self {
        HostError::Delivery(err.to_string())
    }
}

pub struct MessageBus {
    registry: Arc<PluginRegistry>,
    events: EventBus,
}

impl MessageBus {
    pub fn new(registry: Arc<PluginRegistry>, events: EventBus) -> Self {
        Self { registry, events }
    }

    /// Delivers `message` and returns how many components received it.
    ///
    /// The background receives an awaited `handleMessage` call; views receive
    /// one-way notifications.
    pub async fn send(&self, message: PluginMessage) -> Result<usize, BusError> {
        let result = self.route(&message).await;
        match &result {
            Ok(delivered) => debug!(
                plugin = %message.plugin_id,
                topic = %message.topic,
                target = %message.target,
                delivered,
                "Message delivered"
            ),
            Err(e) => {
                warn!(plugin = %message.plugin_id, topic = %message.topic, target = %message.target, error = %e, "Message delivery failed");
                self.events.emit(
                    &message.plugin_id,
                    HostEventKind::DeliveryFailed {
                        topic: message.topic.clone(),
                        target: message.target.to_string(),
                        error: e.to_string(),
                    },
                );
            }
        }
        result
    }

    async fn route(&self, message: &PluginMessage) -> Result<usize, BusError> {
        let plugin_id = &message.plugin_id;
        if !self.registry.is_registered(plugin_id) {
            return Err(BusError::NotRegistered(plugin_id.clone()));
        }
        let envelope = serde_json::to_value(message).map_err(|e| BusError::Malformed(e.to_string()))?;

        let views = match &message.target {
            MessageTarget::Background => {
                let background = self.registry.background(plugin_id).ok_or_else(|| {
                    BusError::NoRecipients {
                        target: message.target.to_string(),
                    }
                })?;
                background
                    .handle_message(&message.topic, envelope)
                    .await
                    .map_err(|e| BusError::Rejected(e.to_string()))?;
                return Ok(1);
            }
            MessageTarget::ViewType(view_type) => self.registry.views_of_type(plugin_id, *view_type),
            MessageTarget::AllViews => self.registry.all_views(plugin_id),
            MessageTarget::View(view_id) => self.registry.view(plugin_id, view_id).into_iter().collect(),
        };
        self.notify_views(message, &views, envelope).await
    }

    async fn notify_views(
        &self,
        message: &PluginMessage,
        views: &[Arc<ViewHandle>],
        envelope: Value,
    ) -> Result<usize, BusError> {
        if views.is_empty() {
            return Err(BusError::NoRecipients {
                target: message.target.to_string(),
            });
        }
        let mut delivered = 0;
        for view in views {
            match view.execution().post_message(&message.topic, envelope.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(plugin = %message.plugin_id, view = %view.view_id(), error = %e, "View unreachable"),
            }
        }
        if delivered == 0 {
            return Err(BusError::Rejected("no view accepted the message".into()));
        }
        Ok(delivered)
    }

    /// Accepts a raw message posted by a context.
    ///
    /// Malformed messages and messages naming another plugin are dropped
    /// before any routing happens.
    pub async fn handle_inbound(&self, origin: &ContextHandle, raw: Value) -> Result<usize, BusError> {
        match parse_inbound(origin, &raw) {
            Ok(message) => self.send(message).await,
            Err(e) => {
                warn!(plugin = %origin.plugin_id, context = %origin.id, error = %e, "Dropping inbound message");
                self.events.emit(
                    &origin.plugin_id,
                    HostEventKind::MessageDropped {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }
}

fn required_str<'a>(raw: &'a serde_json::Map<String, Value>, field: &str) -> Result<&'a str, BusError> {
    raw.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BusError::Malformed(format!("missing or non-string '{field}'")))
}

/// Validates a raw inbound message and stamps it with its real origin.
fn parse_inbound(origin: &ContextHandle, raw: &Value) -> Result<PluginMessage, BusError> {
    let fields = raw
        .as_object()
        .ok_or_else(|| BusError::Malformed("message is not an object".into()))?;
    let plugin_id = required_str(fields, "pluginId")?;
    let source = required_str(fields, "source")?;
    let target = required_str(fields, "target")?;
    let topic = required_str(fields, "topic")?;

    if plugin_id != origin.plugin_id {
        return Err(BusError::CrossPlugin {
            claimed: plugin_id.to_string(),
            origin: origin.plugin_id.clone(),
        });
    }
    if source != origin.component() {
        info!(plugin = %plugin_id, claimed = %source, actual = %origin.component(), "Overriding inbound message source");
    }

    let payload = fields.get("payload").cloned().unwrap_or(Value::Null);
    Ok(PluginMessage::new(
        plugin_id,
        origin.component(),
        MessageTarget::from(target),
        topic,
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionStore;
    use crate::platform::ContextKind;
    use plugdock_core::{PluginConfig, ViewType};
    use serde_json::json;

    fn bus() -> (MessageBus, EventBus) {
        let registry = Arc::new(PluginRegistry::new(Arc::new(PermissionStore::new())));
        registry.register(PluginConfig::new("p1", "One", "1.0.0"));
        let events = EventBus::new();
        (MessageBus::new(registry, events.clone()), events)
    }

    fn summary_origin() -> ContextHandle {
        ContextHandle::new(
            "p1",
            ContextKind::Surface {
                view_id: "summary-p1-1".into(),
                view_type: ViewType::Summary,
            },
        )
    }

    #[test]
    fn test_parse_inbound_stamps_origin() {
        let raw = json!({
            "pluginId": "p1",
            "source": "background",
            "target": "expand",
            "topic": "refresh",
            "payload": {"n": 1}
        });
        let message = parse_inbound(&summary_origin(), &raw).unwrap();
        assert_eq!(message.source, "summary-p1-1");
        assert_eq!(message.target, MessageTarget::ViewType(ViewType::Expand));
        assert_eq!(message.payload["n"], 1);
    }

    #[test]
    fn test_parse_inbound_rejects_bad_envelopes() {
        let origin = summary_origin();
        let missing_topic = json!({"pluginId": "p1", "source": "x", "target": "background"});
        assert!(matches!(
            parse_inbound(&origin, &missing_topic),
            Err(BusError::Malformed(_))
        ));

        let numeric_target = json!({"pluginId": "p1", "source": "x", "target": 3, "topic": "t"});
        assert!(parse_inbound(&origin, &numeric_target).is_err());
        assert!(parse_inbound(&origin, &json!("hello")).is_err());

        let foreign = json!({"pluginId": "p2", "source": "x", "target": "background", "topic": "t"});
        assert!(matches!(
            parse_inbound(&origin, &foreign),
            Err(BusError::CrossPlugin { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_inbound_emits_event() {
        let (bus, events) = bus();
        let mut rx = events.subscribe();
        let err = bus
            .handle_inbound(&summary_origin(), json!({"pluginId": "p1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Malformed(_)));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, HostEventKind::MessageDropped { .. }));
    }

    #[tokio::test]
    async fn test_missing_background_is_reported() {
        let (bus, events) = bus();
        let mut rx = events.subscribe();
        let message = PluginMessage::new("p1", "summary-p1-1", MessageTarget::Background, "ping", Value::Null);
        let err = bus.send(message).await.unwrap_err();
        assert_eq!(err, BusError::NoRecipients { target: "background".into() });
        assert!(matches!(rx.recv().await.unwrap().kind, HostEventKind::DeliveryFailed { .. }));

        // still routing afterwards
        let message = PluginMessage::new("p1", "background", MessageTarget::AllViews, "ping", Value::Null);
        assert!(matches!(bus.send(message).await, Err(BusError::NoRecipients { .. })));
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let (bus, _) = bus();
        let message = PluginMessage::new("ghost", "background", MessageTarget::AllViews, "t", Value::Null);
        assert_eq!(
            bus.send(message).await.unwrap_err(),
            BusError::NotRegistered("ghost".into())
        );
    }
}
