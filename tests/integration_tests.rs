//! End-to-end tests: the typed client against a scripted backend that
//! speaks the full handshake and answers every command the dashboard uses.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hearth_protocol::{ErrorKind, HAError, ServiceTarget, StateChangedData};
use hearth_services::HAClient;
use hearth_transport::{ConnectionConfig, LifecycleEvent, ReconnectPolicy};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const TOKEN: &str = "integration-token";

type Frames = Arc<Mutex<Vec<Value>>>;

/// Start a backend on a random port. Returns its base URL and the log of
/// command frames it received.
async fn start_backend() -> (String, Frames) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let frames: Frames = Arc::new(Mutex::new(Vec::new()));
    let log = frames.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else { return };
                let (mut sink, mut stream) = ws.split();
                let send = |v: Value| Message::Text(v.to_string().into());

                let _ = sink
                    .send(send(json!({"type": "auth_required", "ha_version": "2024.5.0"})))
                    .await;

                while let Some(Ok(Message::Text(text))) = stream.next().await {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    if frame["type"] == "auth" {
                        let reply = if frame["access_token"] == TOKEN {
                            json!({"type": "auth_ok", "ha_version": "2024.5.0"})
                        } else {
                            json!({"type": "auth_invalid", "message": "Invalid access token"})
                        };
                        let _ = sink.send(send(reply)).await;
                        continue;
                    }

                    log.lock().push(frame.clone());
                    for reply in answer(&frame) {
                        let _ = sink.send(send(reply)).await;
                    }
                }
            });
        }
    });

    (url, frames)
}

/// Frames sent back for one command: any pushed events first, then the result.
fn answer(frame: &Value) -> Vec<Value> {
    let id = &frame["id"];
    let ok = |result: Value| json!({"id": id, "type": "result", "success": true, "result": result});

    match frame["type"].as_str().unwrap_or_default() {
        "get_states" => vec![ok(json!([
            {"entity_id": "light.kitchen", "state": "on",
             "attributes": {"friendly_name": "Kitchen", "brightness": 200},
             "last_changed": "2024-05-01T10:00:00+00:00"},
            {"entity_id": "sensor.outside", "state": "unavailable", "attributes": {}}
        ]))],
        "get_config" => vec![ok(json!({"location_name": "Home", "version": "2024.5.0"}))],
        "get_services" => vec![ok(json!({"light": {"turn_on": {}, "turn_off": {}}}))],
        "config/area_registry/list" => vec![ok(json!([
            {"area_id": "kitchen", "name": "Kitchen", "floor_id": "ground", "aliases": []},
            {"area_id": "attic", "name": "Attic", "floor_id": null}
        ]))],
        "config/floor_registry/list" => vec![ok(json!([
            {"floor_id": "ground", "name": "Ground floor", "level": 0}
        ]))],
        "config/device_registry/list" => vec![ok(json!([
            {"id": "dev1", "name": "Hue bridge", "name_by_user": "Kitchen lamp",
             "area_id": "kitchen", "manufacturer": "Signify", "via_device_id": null}
        ]))],
        "config/entity_registry/list" => vec![ok(json!([
            {"entity_id": "light.kitchen", "device_id": "dev1", "area_id": null, "platform": "hue"},
            {"entity_id": "sensor.outside", "area_id": "attic"}
        ]))],
        "subscribe_events" => vec![ok(Value::Null)],
        "media_player/browse_media" => vec![ok(json!({
            "title": "Media Library", "media_content_id": "", "children": []
        }))],
        "call_service" if frame["domain"] == "light" => {
            let entity = frame["target"]["entity_id"][0].clone();
            vec![
                json!({"id": 1, "type": "event", "event": {
                    "event_type": "state_changed",
                    "data": {
                        "entity_id": entity,
                        "old_state": {"entity_id": entity, "state": "off", "attributes": {}},
                        "new_state": {"entity_id": entity, "state": "on", "attributes": {}}
                    },
                    "origin": "LOCAL",
                    "time_fired": "2024-05-01T10:00:01.000000+00:00"
                }}),
                ok(json!({"context": {"id": "ctx-1"}})),
            ]
        }
        "call_service" if frame["domain"] == "media_player" => {
            vec![ok(json!({"context": {"id": "ctx-2"}}))]
        }
        "call_service" => vec![json!({
            "id": id, "type": "result", "success": false,
            "error": {"code": "not_found", "message": "Service not found."}
        })],
        _ => vec![json!({
            "id": id, "type": "result", "success": false,
            "error": {"code": "unknown_command", "message": "Unknown command."}
        })],
    }
}

async fn connected_client(url: &str) -> HAClient {
    let config = ConnectionConfig::new(url, TOKEN).with_reconnect(ReconnectPolicy::disabled());
    let client = HAClient::new(config);
    let ok = timeout(Duration::from_secs(5), client.connect())
        .await
        .expect("Timeout connecting")
        .expect("connect failed");
    assert!(ok);
    client
}

fn sent(frames: &Frames, command: &str) -> Vec<Value> {
    frames
        .lock()
        .iter()
        .filter(|f| f["type"] == command)
        .cloned()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn states_decode_into_entities() {
    let (url, _) = start_backend().await;
    let client = connected_client(&url).await;

    let states = client.get_states().await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].friendly_name(), Some("Kitchen"));
    assert_eq!(states[0].domain(), "light");
    assert!(states[0].last_changed.is_some());
    assert!(states[1].is_unavailable());
}

#[tokio::test]
async fn registries_resolve_entity_areas_through_devices() {
    let (url, _) = start_backend().await;
    let client = connected_client(&url).await;

    let (areas, floors, devices, entities) = tokio::try_join!(
        client.list_areas(),
        client.list_floors(),
        client.list_devices(),
        client.list_entities(),
    )
    .unwrap();

    assert_eq!(areas.len(), 2);
    assert_eq!(areas[0].floor_id.as_deref(), Some("ground"));
    assert_eq!(floors[0].level, Some(0));
    assert_eq!(devices[0].display_name(), Some("Kitchen lamp"));
    // Unmodelled registry fields are kept.
    assert!(devices[0].extra.contains_key("via_device_id"));

    assert_eq!(entities[0].resolved_area(&devices), Some("kitchen"));
    assert_eq!(entities[1].resolved_area(&devices), Some("attic"));
}

#[tokio::test]
async fn config_and_services_are_passed_through() {
    let (url, _) = start_backend().await;
    let client = connected_client(&url).await;

    let config = client.get_config().await.unwrap();
    assert_eq!(config["location_name"], "Home");
    let services = client.get_services().await.unwrap();
    assert!(services["light"].get("turn_on").is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions and events
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_service_frame_and_resulting_state_change() {
    let (url, frames) = start_backend().await;
    let client = connected_client(&url).await;

    let changes: Arc<Mutex<Vec<StateChangedData>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    let _sub = client
        .subscribe_state_changes(move |change| sink.lock().push(change.clone()))
        .await
        .unwrap();

    let result = client
        .call_service(
            "light",
            "turn_on",
            Some(json!({"brightness": 128})),
            Some(ServiceTarget::entity("light.kitchen")),
        )
        .await
        .unwrap();
    assert_eq!(result["context"]["id"], "ctx-1");

    let calls = sent(&frames, "call_service");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["domain"], "light");
    assert_eq!(calls[0]["service"], "turn_on");
    assert_eq!(calls[0]["service_data"], json!({"brightness": 128}));
    assert_eq!(calls[0]["target"], json!({"entity_id": ["light.kitchen"]}));

    let changes = changes.lock();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].entity_id, "light.kitchen");
    assert_eq!(changes[0].new_state.as_ref().map(|s| s.state.as_str()), Some("on"));
}

#[tokio::test]
async fn raw_event_subscribers_see_event_metadata() {
    let (url, frames) = start_backend().await;
    let client = connected_client(&url).await;

    let seen = Arc::new(AtomicUsize::new(0));
    let hits = seen.clone();
    let _sub = client
        .subscribe_events("state_changed", move |event| {
            assert_eq!(event.origin.as_deref(), Some("LOCAL"));
            assert!(event.time_fired.is_some());
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    // A second typed subscriber shares the server subscription.
    let _typed = client.subscribe_state_changes(|_| {}).await.unwrap();
    assert_eq!(sent(&frames, "subscribe_events").len(), 1);

    client
        .call_service("light", "turn_off", None, Some(ServiceTarget::entity("light.kitchen")))
        .await
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn play_media_targets_the_player() {
    let (url, frames) = start_backend().await;
    let client = connected_client(&url).await;

    client
        .play_media("media_player.living_room", "spotify:playlist:1", "playlist")
        .await
        .unwrap();

    let calls = sent(&frames, "call_service");
    assert_eq!(calls[0]["domain"], "media_player");
    assert_eq!(calls[0]["service"], "play_media");
    assert_eq!(
        calls[0]["service_data"],
        json!({"media_content_id": "spotify:playlist:1", "media_content_type": "playlist"})
    );
    assert_eq!(calls[0]["target"]["entity_id"], json!(["media_player.living_room"]));
}

#[tokio::test]
async fn browse_media_pairs_content_fields_on_the_wire() {
    let (url, frames) = start_backend().await;
    let client = connected_client(&url).await;

    let root = client
        .browse_media("media_player.living_room", None, None)
        .await
        .unwrap();
    assert_eq!(root["title"], "Media Library");
    client
        .browse_media("media_player.living_room", None, Some("app"))
        .await
        .unwrap();

    let browses = sent(&frames, "media_player/browse_media");
    assert!(browses[0].get("media_content_id").is_none());
    assert!(browses[0].get("media_content_type").is_none());
    assert_eq!(browses[1]["media_content_id"], "");
    assert_eq!(browses[1]["media_content_type"], "app");
}

#[tokio::test]
async fn unknown_service_is_a_service_error() {
    let (url, _) = start_backend().await;
    let client = connected_client(&url).await;

    match client.call_service("nope", "turn_on", None, None).await {
        Err(HAError::Service { code, message }) => {
            assert_eq!(code, "not_found");
            assert_eq!(message, "Service not found.");
        }
        other => panic!("unexpected {other:?}"),
    }
    // The connection survives a failed call.
    assert!(client.is_connected());
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_service_before_connect_writes_nothing() {
    let (url, frames) = start_backend().await;
    let client = HAClient::new(ConnectionConfig::new(&url, TOKEN));

    let err = client
        .call_service("light", "turn_on", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert!(frames.lock().is_empty());
}

#[tokio::test]
async fn wrong_token_surfaces_auth_invalid() {
    let (url, _) = start_backend().await;
    let client = HAClient::new(ConnectionConfig::new(&url, "nope"));
    let mut lifecycle = client.lifecycle();

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthInvalid);
    assert_eq!(
        timeout(Duration::from_secs(5), lifecycle.recv()).await.unwrap().unwrap(),
        LifecycleEvent::AuthRejected {
            message: "Invalid access token".into()
        }
    );
    assert!(!client.is_connected());
}

#[tokio::test]
async fn disconnect_ends_the_session() {
    let (url, _) = start_backend().await;
    let client = connected_client(&url).await;
    let mut lifecycle = client.lifecycle();

    client.disconnect();
    assert_eq!(
        timeout(Duration::from_secs(5), lifecycle.recv()).await.unwrap().unwrap(),
        LifecycleEvent::Disconnected { clean: true }
    );
    assert!(!client.is_connected());
    assert_eq!(
        client.get_states().await.unwrap_err().kind(),
        ErrorKind::NotConnected
    );

    // An explicit connect starts a new session.
    assert!(client.connect().await.unwrap());
    assert_eq!(client.get_states().await.unwrap().len(), 2);
}
