mod common;

use std::time::Duration;

use common::{eventually, plugin, Harness};
use plugdock_core::{HostError, HostEventKind, MessageTarget, PluginMessage, ViewType};
use plugdock_plugins::BusError;
use serde_json::{json, Value};

fn host_message(plugin_id: &str, target: MessageTarget, topic: &str) -> PluginMessage {
    PluginMessage::new(plugin_id, "host", target, topic, json!({"n": 1}))
}

#[tokio::test]
async fn summary_target_reaches_only_summaries() {
    let h = Harness::new(vec![]);
    h.install(plugin("p2"));

    let s1 = h.manager.open_view("p2", ViewType::Summary).await.unwrap();
    let s2 = h.manager.open_view("p2", ViewType::Summary).await.unwrap();
    let e1 = h.manager.open_view("p2", ViewType::Expand).await.unwrap();
    assert!(s1.view_id().starts_with("summary-p2-"));
    assert!(e1.view_id().starts_with("expand-p2-"));
    assert_ne!(s1.view_id(), s2.view_id());

    let delivered = h
        .manager
        .send_message(host_message("p2", MessageTarget::ViewType(ViewType::Summary), "refresh"))
        .await
        .unwrap();
    assert_eq!(delivered, 2);

    let key = |id: &str| format!("p2/{id}");
    assert!(eventually(|| h.journal.count("message:refresh") == 2).await);
    assert!(h.journal.find(&key(s1.view_id()), "message:refresh").is_some());
    assert!(h.journal.find(&key(s2.view_id()), "message:refresh").is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.journal.find(&key(e1.view_id()), "message:refresh").is_none());
}

#[tokio::test]
async fn broadcast_and_direct_targets() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    h.install(plugin("p2"));
    let own = h.manager.open_view("p1", ViewType::Summary).await.unwrap();
    h.manager.open_view("p1", ViewType::Expand).await.unwrap();
    let foreign = h.manager.open_view("p2", ViewType::Summary).await.unwrap();

    let all = h
        .manager
        .send_message(host_message("p1", MessageTarget::AllViews, "tick"))
        .await
        .unwrap();
    assert_eq!(all, 2);

    let direct = h
        .manager
        .send_message(host_message("p1", MessageTarget::View(own.view_id().into()), "poke"))
        .await
        .unwrap();
    assert_eq!(direct, 1);

    // a view id of another plugin is not reachable through p1
    let err = h
        .manager
        .send_message(host_message("p1", MessageTarget::View(foreign.view_id().into()), "poke"))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Delivery(_)));

    assert!(eventually(|| h.journal.count("message:tick") == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h
        .journal
        .events_for(&format!("p2/{}", foreign.view_id()))
        .iter()
        .all(|e| !e.starts_with("message:")));
}

#[tokio::test]
async fn missing_background_fails_delivery_only() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    let mut events = h.manager.subscribe();

    let err = h
        .manager
        .send_message(host_message("p1", MessageTarget::Background, "ping"))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Delivery(_)));
    let event = events.recv().await.unwrap();
    assert!(matches!(event.kind, HostEventKind::DeliveryFailed { .. }));

    h.manager.open_view("p1", ViewType::Summary).await.unwrap();
    let delivered = h
        .manager
        .send_message(host_message("p1", MessageTarget::AllViews, "ping"))
        .await
        .unwrap();
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn background_receives_awaited_call() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    h.manager.execute_plugin("p1").await.unwrap();

    let delivered = h
        .manager
        .send_message(host_message("p1", MessageTarget::Background, "sync"))
        .await
        .unwrap();
    assert_eq!(delivered, 1);
    // awaited, so it has already been handled
    let entry = h.journal.find("p1/background", "message:sync").unwrap();
    assert_eq!(entry.data["source"], "host");
    assert_eq!(entry.data["payload"]["n"], 1);
}

#[tokio::test]
async fn messaging_api_stamps_identity() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    h.manager.execute_plugin("p1").await.unwrap();
    let view = h.manager.open_view("p1", ViewType::Summary).await.unwrap();

    let api = h.api_for("p1", "background").unwrap();
    let delivered = api
        .messaging()
        .send(MessageTarget::ViewType(ViewType::Summary), "forecast", &json!({"temp": 21}))
        .await
        .unwrap();
    assert_eq!(delivered, 1);

    let key = format!("p1/{}", view.view_id());
    assert!(eventually(|| h.journal.find(&key, "message:forecast").is_some()).await);
    let entry = h.journal.find(&key, "message:forecast").unwrap();
    assert_eq!(entry.data["pluginId"], "p1");
    assert_eq!(entry.data["source"], "background");
    assert_eq!(entry.data["payload"]["temp"], 21);

    // and back from the view to the background
    let view_api = h.api_for("p1", view.view_id()).unwrap();
    view_api
        .messaging()
        .send(MessageTarget::Background, "clicked", &Value::Null)
        .await
        .unwrap();
    let entry = h.journal.find("p1/background", "message:clicked").unwrap();
    assert_eq!(entry.data["source"], view.view_id());
}

#[tokio::test]
async fn inbound_messages_are_validated() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    h.manager.execute_plugin("p1").await.unwrap();
    let view = h.manager.open_view("p1", ViewType::Summary).await.unwrap();
    let inbound = h.platform.take_inbound().unwrap();
    let _pump = h.manager.spawn_inbound_pump(inbound);
    let mut events = h.manager.subscribe();

    let env = h.env_for("p1", view.view_id()).unwrap();

    // missing topic
    assert!(env.post_to_host(json!({"pluginId": "p1", "source": view.view_id(), "target": "background"})));
    // foreign plugin
    assert!(env.post_to_host(json!({
        "pluginId": "p2", "source": view.view_id(), "target": "background", "topic": "steal"
    })));
    // well formed
    assert!(env.post_to_host(json!({
        "pluginId": "p1", "source": view.view_id(), "target": "background", "topic": "hello",
        "payload": {"x": true}
    })));

    assert!(eventually(|| h.journal.find("p1/background", "message:hello").is_some()).await);
    assert!(h.journal.find("p1/background", "message:steal").is_none());
    assert_eq!(h.journal.count("message:hello"), 1);

    let mut dropped = 0;
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
        if matches!(event.kind, HostEventKind::MessageDropped { .. }) {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 2);
}

#[tokio::test]
async fn handle_inbound_reports_errors() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    let view = h.manager.open_view("p1", ViewType::Summary).await.unwrap();
    let origin = view.execution().context().clone();

    let err = h
        .manager
        .handle_inbound(&origin, json!({"pluginId": "p1", "source": "x", "target": "background"}))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Malformed(_)));

    let err = h
        .manager
        .handle_inbound(
            &origin,
            json!({"pluginId": "p1", "source": "x", "target": "background", "topic": "t"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::NoRecipients { .. }));
}

#[tokio::test]
async fn closed_view_no_longer_receives() {
    let h = Harness::new(vec![]);
    h.install(plugin("p1"));
    let view = h.manager.open_view("p1", ViewType::Expand).await.unwrap();
    assert!(h.manager.close_view("p1", view.view_id()).await);
    assert!(!h.manager.close_view("p1", view.view_id()).await);

    let err = h
        .manager
        .send_message(host_message("p1", MessageTarget::ViewType(ViewType::Expand), "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Delivery(_)));
    assert_eq!(h.platform.live_count(), 0);
}
