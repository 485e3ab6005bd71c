//! Shared test utilities: an in-process websocket server driven by a
//! per-test script, plus frame builders.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lobsync::config::SessionConfig;
use lobsync::websocket::Heartbeat;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tungstenite::Message;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Heartbeat slow enough that no ping shows up during a test.
pub const QUIET: Heartbeat = Heartbeat {
    interval: Duration::from_secs(60),
    timeout: Duration::from_secs(60),
};

pub struct MockServer {
    pub url: String,
    pub task: JoinHandle<()>,
}

/// Accepts exactly one websocket client and hands it to `script`.
pub async fn serve<F, Fut>(script: F) -> MockServer
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let addr = listener.local_addr().expect("mock server has no address");

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        let ws = accept_async(stream).await.expect("websocket upgrade failed");
        script(ws).await;
    });

    MockServer {
        url: format!("ws://{addr}"),
        task,
    }
}

/// Session settings with short timeouts for tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        ack_timeout: Duration::from_millis(200),
        handshake_timeout: Duration::from_secs(2),
        queue_capacity: 16,
    }
}

pub async fn send(ws: &mut ServerWs, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("mock server send failed");
}

pub async fn send_welcome(ws: &mut ServerWs) {
    send(ws, json!({"id": "welcome-1", "type": "welcome"})).await;
}

pub async fn send_ack(ws: &mut ServerWs, id: &str) {
    send(ws, json!({"id": id, "type": "ack"})).await;
}

pub async fn send_pong(ws: &mut ServerWs, id: &str) {
    send(ws, json!({"id": id, "type": "pong"})).await;
}

pub async fn send_message(ws: &mut ServerWs, topic: &str, data: Value) {
    send(
        ws,
        json!({"type": "message", "topic": topic, "subject": "update", "data": data}),
    )
    .await;
}

/// Next JSON request from the client, or `None` once it disconnects.
pub async fn next_request(ws: &mut ServerWs) -> Option<Value> {
    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                return Some(serde_json::from_str(&text).expect("client sent invalid json"));
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Reads until the client goes away.
pub async fn drain(ws: &mut ServerWs) {
    while next_request(ws).await.is_some() {}
}

/// Answers every ping with a pong until the client goes away.
pub async fn answer_pings(ws: &mut ServerWs) {
    while let Some(request) = next_request(ws).await {
        if request["type"] == "ping" {
            let id = request["id"].as_str().unwrap_or_default().to_string();
            send_pong(ws, &id).await;
        }
    }
}

/// Acks the next request, which must be a subscribe, and returns it.
pub async fn ack_subscribe(ws: &mut ServerWs) -> Value {
    let request = next_request(ws).await.expect("client hung up before subscribing");
    assert_eq!(request["type"], "subscribe");
    let id = request["id"].as_str().expect("request without id").to_string();
    send_ack(ws, &id).await;
    request
}
