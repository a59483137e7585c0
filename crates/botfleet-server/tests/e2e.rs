//! End-to-end: a fleet on a scripted transport behind a real listener.

use std::sync::Arc;
use std::time::Duration;

use botfleet_core::InstanceId;
use botfleet_hub::BroadcastHub;
use botfleet_runtime::transport::scripted::ScriptedConnector;
use botfleet_runtime::{Connector, Fleet, TransportEvent};
use botfleet_server::{GatewayServer, InstanceDirectory, ServerConfig, ServerHandle};
use botfleet_settings::BotSettings;
use futures::StreamExt;
use serde_json::{Value, json};

struct Harness {
    hub: Arc<BroadcastHub>,
    scripted: ScriptedConnector,
    fleet: Fleet,
    handle: ServerHandle,
    base: String,
}

async fn boot() -> Harness {
    let hub = Arc::new(BroadcastHub::default());
    let scripted = ScriptedConnector::new();
    scripted.connect_ok();
    let connector: Arc<dyn Connector> = Arc::new(scripted.clone());

    let bots = vec![BotSettings {
        host: "play.example".into(),
        username: "alex".into(),
        display_name: Some("Shop bot".into()),
        ..BotSettings::default()
    }];
    let fleet = Fleet::launch(&bots, &hub, &connector).await.unwrap();
    let directory = Arc::new(InstanceDirectory::from_fleet(&fleet));

    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        keep_alive_secs: 1,
    };
    let handle = GatewayServer::new(config, Arc::clone(&hub), directory)
        .start()
        .await
        .unwrap();
    let base = format!("http://127.0.0.1:{}", handle.port());

    let id = InstanceId::indexed(0);
    for _ in 0..200 {
        if hub.is_connected(&id) == Some(true) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.is_connected(&id), Some(true));

    Harness {
        hub,
        scripted,
        fleet,
        handle,
        base,
    }
}

#[tokio::test]
async fn instances_lists_launched_fleet() {
    let h = boot().await;
    let list: Value = reqwest::get(format!("{}/instances", h.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list[0]["id"], "instance-0");
    assert_eq!(list[0]["meta"]["bot"]["username"], "alex");
    assert_eq!(list[0]["meta"]["displayName"], "Shop bot");
    assert_eq!(list[0]["meta"]["connected"], true);

    let _ = h.fleet.shutdown().await;
    assert!(h.handle.stop(Some(Duration::from_secs(5))).await);
}

#[tokio::test]
async fn events_stream_carries_chat_and_ends_on_stop() {
    let h = boot().await;
    let resp = reqwest::get(format!("{}/events/instance-0", h.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let mut stream = resp.bytes_stream();

    for _ in 0..200 {
        if h.hub.subscriber_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.scripted.emit(TransportEvent::Message("<sam> anyone selling iron?".into())));

    let mut text = String::new();
    while !text.contains("anyone selling iron?") {
        let chunk = stream.next().await.unwrap().unwrap();
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    let meta_at = text.find("event: meta").unwrap();
    let status_at = text.find("event: status").unwrap();
    assert!(meta_at < status_at);
    assert!(text.contains("\"connected\":true"));

    let _ = h.fleet.shutdown().await;
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = stream.next().await {
            if chunk.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok(), "stream should end once the instance is stopped");
    assert!(h.handle.stop(Some(Duration::from_secs(5))).await);
}

#[tokio::test]
async fn send_reaches_transport_then_is_not_found_after_stop() {
    let h = boot().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/send/instance-0", h.base))
        .json(&json!({ "message": "hello from http" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "ok": true }));
    assert_eq!(h.scripted.sent(), vec!["hello from http".to_string()]);

    let resp = client
        .post(format!("{}/send/instance-5", h.base))
        .json(&json!({ "message": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let _ = h.fleet.shutdown().await;
    let resp = client
        .post(format!("{}/send/instance-0", h.base))
        .json(&json!({ "message": "too late" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
    assert_eq!(h.scripted.sent(), vec!["hello from http".to_string()]);

    assert!(h.handle.stop(Some(Duration::from_secs(5))).await);
}

#[tokio::test]
async fn health_over_the_wire() {
    let h = boot().await;
    let v: Value = reqwest::get(format!("{}/health", h.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["instances"], 1);

    let _ = h.fleet.shutdown().await;
    assert!(h.handle.stop(Some(Duration::from_secs(5))).await);
}
