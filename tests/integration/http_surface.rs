//! Integration tests for the relay's plain HTTP endpoints.
//!
//! Verification command: `cargo test --test http_surface`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio_tungstenite::tungstenite;

use pairlink_proto::ServerMessage;
use pairlink_relay::config::RelayConfig;
use pairlink_relay::relay::{
    CreatedRoom, RelayState, StatusReport, start_server, start_server_with_state,
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Issues `GET path` against the relay.
async fn http_get(addr: std::net::SocketAddr, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://{addr}{path}")).await.unwrap()
}

async fn connect(addr: std::net::SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn join(ws: &mut WsStream, room: &str) -> ServerMessage {
    let text = format!(r#"{{"type":"join","roomId":"{room}"}}"#);
    ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    let resp = http_get(addr, "/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn created_room_id_can_be_joined() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();

    let resp = http_get(addr, "/create").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let CreatedRoom { id } = resp.json().await.unwrap();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    // The room starts empty, so the first websocket joiner takes slot one.
    let mut x = connect(addr).await;
    assert_eq!(
        join(&mut x, &id).await,
        ServerMessage::Created {
            room_id: id.clone()
        }
    );
    let mut y = connect(addr).await;
    assert_eq!(
        join(&mut y, &id).await,
        ServerMessage::Joined { room_id: id, count: 2 }
    );
}

#[tokio::test]
async fn created_rooms_satisfy_require_existing() {
    let config = RelayConfig {
        require_existing_room: true,
        ..RelayConfig::default()
    };
    let state = Arc::new(RelayState::with_config(&config));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state).await.unwrap();

    let CreatedRoom { id } = http_get(addr, "/create").await.json().await.unwrap();

    let mut x = connect(addr).await;
    assert!(matches!(
        join(&mut x, &id).await,
        ServerMessage::Created { .. }
    ));
}

#[tokio::test]
async fn create_reports_unavailable_at_capacity() {
    let config = RelayConfig {
        max_rooms: 1,
        ..RelayConfig::default()
    };
    let state = Arc::new(RelayState::with_config(&config));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state).await.unwrap();

    assert_eq!(http_get(addr, "/create").await.status(), StatusCode::OK);
    let resp = http_get(addr, "/create").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn status_counts_rooms_connections_and_slots() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();

    let idle: StatusReport = http_get(addr, "/status").await.json().await.unwrap();
    assert_eq!(
        idle,
        StatusReport {
            rooms: 0,
            connections: 0,
            occupied_slots: 0
        }
    );

    let mut x = connect(addr).await;
    let mut y = connect(addr).await;
    assert!(matches!(join(&mut x, "counted").await, ServerMessage::Created { .. }));
    assert!(matches!(join(&mut y, "counted").await, ServerMessage::Joined { .. }));
    let _ = http_get(addr, "/create").await;

    let raw: serde_json::Value = http_get(addr, "/status").await.json().await.unwrap();
    assert!(raw.get("occupiedSlots").is_some());
    let busy: StatusReport = serde_json::from_value(raw).unwrap();
    assert_eq!(
        busy,
        StatusReport {
            rooms: 2,
            connections: 2,
            occupied_slots: 2
        }
    );
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.unwrap();
    assert_eq!(http_get(addr, "/nope").await.status(), StatusCode::NOT_FOUND);
}
