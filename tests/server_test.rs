use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ride_relay::config::EngineConfig;
use ride_relay::core::engine::PresenceEngine;
use ride_relay::handlers;
use ride_relay::storage::NoopSink;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> std::net::SocketAddr {
    let engine = PresenceEngine::new(EngineConfig::default(), Arc::new(NoopSink));
    let routes = handlers::routes(engine);
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn ws_connect(addr: std::net::SocketAddr, query: &str) -> WsClient {
    let url = format!("ws://{}/ws?{}", addr, query);
    let (ws, _) = connect_async(url).await.expect("WebSocket handshake");
    ws
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().expect("text frame"))
                .expect("valid JSON event");
        }
    }
}

async fn send_json(ws: &mut WsClient, payload: &str) {
    ws.send(Message::Text(payload.to_string()))
        .await
        .expect("send frame");
}

#[tokio::test]
async fn test_handshake_and_http_introspection() {
    let addr = start_server().await;

    let mut ws = ws_connect(addr, "user_id=u1&role=police").await;
    let ready = next_json(&mut ws).await;
    assert_eq!(ready["type"], "session:ready");
    assert_eq!(ready["userId"], "u1");
    assert_eq!(ready["role"], "police");

    let health = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("health request")
        .text()
        .await
        .expect("health body");
    assert_eq!(health, "OK");

    let stats: Value = reqwest::get(format!("http://{}/stats", addr))
        .await
        .expect("stats request")
        .json()
        .await
        .expect("stats body");
    assert_eq!(stats["connections"], 1);
    assert_eq!(stats["tracking"]["subscriptionLinks"], 0);
}

#[tokio::test]
async fn test_handshake_rejects_unknown_role() {
    let addr = start_server().await;
    let url = format!("ws://{}/ws?user_id=u1&role=pilot", addr);
    assert!(connect_async(url).await.is_err());

    let url = format!("ws://{}/ws?role=police", addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_chat_round_trip_over_transport() {
    let addr = start_server().await;

    let mut alice = ws_connect(addr, "user_id=alice&role=rider").await;
    let mut bob = ws_connect(addr, "user_id=bob&role=rider").await;
    next_json(&mut alice).await; // session:ready
    next_json(&mut bob).await;

    send_json(&mut alice, r#"{"type":"chat:join","conversationId":"c1"}"#).await;
    assert_eq!(next_json(&mut alice).await["type"], "chat:joined");
    send_json(&mut bob, r#"{"type":"chat:join","conversationId":"c1"}"#).await;
    assert_eq!(next_json(&mut bob).await["type"], "chat:joined");

    send_json(
        &mut alice,
        r#"{"type":"message:new","conversationId":"c1","message":"arriving now"}"#,
    )
    .await;

    let delivered = next_json(&mut bob).await;
    assert_eq!(delivered["type"], "message:new");
    assert_eq!(delivered["senderId"], "alice");
    assert_eq!(delivered["message"], "arriving now");

    let ack = next_json(&mut alice).await;
    assert_eq!(ack["type"], "message:sent");
    assert_eq!(ack["conversationId"], "c1");
}

#[tokio::test]
async fn test_malformed_event_gets_error_envelope() {
    let addr = start_server().await;
    let mut ws = ws_connect(addr, "user_id=u1&role=rider").await;
    next_json(&mut ws).await; // session:ready

    send_json(&mut ws, r#"{"type":"no-such-event"}"#).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Malformed event");
}

#[tokio::test]
async fn test_disconnect_drops_connection_count() {
    let addr = start_server().await;
    let ws = ws_connect(addr, "user_id=u1&role=rider").await;
    drop(ws);

    // Give the server a moment to observe the close
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats: Value = reqwest::get(format!("http://{}/stats", addr))
        .await
        .expect("stats request")
        .json()
        .await
        .expect("stats body");
    assert_eq!(stats["connections"], 0);
}
