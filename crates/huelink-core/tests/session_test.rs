#![allow(clippy::unwrap_used)]
// Integration tests for `Bridge` sessions against a wiremock bridge.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huelink_core::{Bridge, CoreError, LightUpdate, QueueSettings};
use huelink_api::BridgeClient;

const KEY: &str = "session-key";

fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({ "errors": [], "data": data })
}

async fn mount_get(server: &MockServer, route: &str, data: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(data)))
        .mount(server)
        .await;
}

/// A bridge with one light, one room and one scene. The push stream answers
/// after `stream_delay` with `stream_body`.
async fn bridge_server(stream_body: &'static str, stream_delay: Duration) -> MockServer {
    let server = MockServer::start().await;

    mount_get(&server, "/clip/v2/resource/bridge", json!([{ "id": "b1", "bridge_id": "001788fffe4a7b2c" }])).await;
    mount_get(
        &server,
        "/clip/v2/resource/light",
        json!([{
            "id": "l1", "type": "light",
            "metadata": { "name": "Desk lamp", "archetype": "desk_lamp" },
            "on": { "on": false },
            "dimming": { "brightness": 40.0 }
        }]),
    )
    .await;
    mount_get(
        &server,
        "/clip/v2/resource/grouped_light",
        json!([{ "id": "g1", "type": "grouped_light", "on": { "on": false } }]),
    )
    .await;
    mount_get(
        &server,
        "/clip/v2/resource/room",
        json!([{
            "id": "r1", "type": "room",
            "metadata": { "name": "Office" },
            "children": [],
            "services": [{ "rid": "g1", "rtype": "grouped_light" }]
        }]),
    )
    .await;
    mount_get(&server, "/clip/v2/resource/zone", json!([])).await;
    mount_get(
        &server,
        "/clip/v2/resource/scene",
        json!([{ "id": "s1", "type": "scene", "metadata": { "name": "Focus" } }]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/eventstream/clip/v2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(stream_body, "text/event-stream")
                .set_delay(stream_delay),
        )
        .mount(&server)
        .await;

    server
}

fn client(server: &MockServer) -> BridgeClient {
    BridgeClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        SecretString::from(KEY.to_owned()),
        QueueSettings::default(),
    )
}

#[tokio::test]
async fn test_start_loads_every_collection() {
    let server = bridge_server("", Duration::ZERO).await;
    let bridge = Bridge::start("001788fffe4a7b2c".into(), client(&server)).await.unwrap();

    assert_eq!(bridge.id(), "001788fffe4a7b2c");
    assert_eq!(bridge.store().lights().len(), 1);
    assert_eq!(bridge.store().rooms()[0].0.metadata.name, "Office");
    assert_eq!(bridge.find_light("desk LAMP").as_deref(), Some("l1"));
    assert_eq!(bridge.find_group("office").as_deref(), Some("g1"));
    assert_eq!(bridge.find_scene("s1").as_deref(), Some("s1"));
    assert!(bridge.find_group("Kitchen").is_none());
    bridge.shutdown();
}

#[tokio::test]
async fn test_rejected_key_fails_start() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip/v2/resource/bridge"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": [{ "description": "unauthorized user" }], "data": []
        })))
        .mount(&server)
        .await;

    let err = Bridge::start("b".into(), client(&server)).await.err().unwrap();
    assert!(matches!(err, CoreError::Credential));
    assert!(err.requires_relink());
}

#[tokio::test]
async fn test_push_events_merge_into_store() {
    let body = concat!(
        "id: 1:0\n",
        "data: [{\"type\":\"update\",\"data\":[{\"id\":\"l1\",\"type\":\"light\",\n",
        "data: \"on\":{\"on\":true}}]}]\n\n",
    );
    let server = bridge_server(body, Duration::from_millis(300)).await;
    let bridge = Bridge::start("b".into(), client(&server)).await.unwrap();

    let mut lights = bridge.store().subscribe_lights();
    let updated = tokio::time::timeout(Duration::from_secs(5), lights.wait_for(|snap| snap[0].on.on))
        .await
        .unwrap()
        .unwrap()
        .clone();

    // Only `on` changed; the rest of the record survives the merge.
    assert_eq!(updated[0].metadata.name, "Desk lamp");
    assert!((updated[0].dimming.as_ref().unwrap().brightness - 40.0).abs() < f64::EPSILON);
    assert_eq!(updated.len(), 1);
}

#[tokio::test]
async fn test_set_light_is_optimistic() {
    let server = bridge_server("", Duration::ZERO).await;
    Mock::given(method("PUT"))
        .and(path("/clip/v2/resource/light/l1"))
        .and(body_json(json!({ "on": { "on": true }, "dimming": { "brightness": 80.0 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([{ "rid": "l1", "rtype": "light" }]))))
        .mount(&server)
        .await;

    let bridge = Bridge::start("b".into(), client(&server)).await.unwrap();
    let ack = bridge
        .set_light("l1", &LightUpdate::default().on(true).brightness(80.0))
        .await
        .unwrap();

    assert_eq!(ack[0]["rid"], "l1");
    let light = bridge.store().light("l1").unwrap();
    assert!(light.on.on);
    assert!((light.dimming.as_ref().unwrap().brightness - 80.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_failed_command_rolls_back() {
    let server = bridge_server("", Duration::ZERO).await;
    Mock::given(method("PUT"))
        .and(path("/clip/v2/resource/grouped_light/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "description": "device unreachable" }], "data": []
        })))
        .mount(&server)
        .await;

    let bridge = Bridge::start("b".into(), client(&server)).await.unwrap();
    let err = bridge
        .set_grouped_light("g1", &LightUpdate::default().on(true))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Request { .. }), "{err:?}");
    assert!(!bridge.store().grouped_light("g1").unwrap().on.unwrap().on);
}

#[tokio::test]
async fn test_recall_scene() {
    let server = bridge_server("", Duration::ZERO).await;
    Mock::given(method("PUT"))
        .and(path("/clip/v2/resource/scene/s1"))
        .and(body_json(json!({ "recall": { "action": "active" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([{ "rid": "s1", "rtype": "scene" }]))))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = Bridge::start("b".into(), client(&server)).await.unwrap();
    bridge.recall_scene("s1").await.unwrap();
}
