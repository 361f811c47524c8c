//! HTTP transport integration tests.
//!
//! Starts the relay on an ephemeral port and exercises it with reqwest and
//! tokio-tungstenite.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use trail_relay::{http, RelayHub};

use crate::support::{eventually, position, WAIT};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bind to port 0 and return the actual address.
async fn start_server(hub: RelayHub) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        http::serve_with_listener(hub, listener).await.unwrap();
    });
    addr
}

async fn subscribe(hub: &RelayHub, addr: SocketAddr) -> Ws {
    let before = hub.subscriber_count();
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    assert!(eventually(|| hub.subscriber_count() > before).await);
    ws
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn post_event(addr: SocketAddr, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/events"))
        .json(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn post_with_no_subscribers_returns_event_sent() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;

    let resp = post_event(addr, &position("A", 1)).await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "event sent" }));
    assert_eq!(hub.metrics().processed(), 1);
}

#[tokio::test]
async fn three_websocket_clients_each_receive_the_event_once() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(subscribe(&hub, addr).await);
    }

    let event = position("A", 1);
    assert_eq!(post_event(addr, &event).await.status(), 200);
    assert_eq!(post_event(addr, &position("A", 2)).await.status(), 200);

    for ws in clients.iter_mut() {
        assert_eq!(next_event(ws).await, event);
        assert_eq!(next_event(ws).await["seq"], 2);
    }
}

#[tokio::test]
async fn relayed_frame_is_the_posted_body() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;
    let mut ws = subscribe(&hub, addr).await;

    let body = r#"{"time":"2024-05-01T09:00:00Z","athlete":"A","id":123456789012345678901234567890,"location":{"longitude":-3.7038,"latitude":40.416800000000000001}}"#;
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/events"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let frame = tokio::time::timeout(WAIT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame, Message::Text(body.to_string()));
}

#[tokio::test]
async fn closed_client_is_deregistered_and_others_still_receive() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;

    let mut a = subscribe(&hub, addr).await;
    let mut b = subscribe(&hub, addr).await;
    b.close(None).await.unwrap();
    assert!(eventually(|| hub.subscriber_count() == 1).await);

    let resp = post_event(addr, &position("A", 1)).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(next_event(&mut a).await["athlete"], "A");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/events"))
        .header("content-type", "application/json")
        .body("{\"athlete\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("malformed payload"));

    let resp = post_event(addr, &json!(["not", "an", "object"])).await;
    assert_eq!(resp.status(), 400);

    assert_eq!(hub.metrics().malformed(), 2);
    assert_eq!(hub.metrics().processed(), 0);
}

#[tokio::test]
async fn metrics_endpoint_exposes_relay_counters() {
    let hub = RelayHub::builder().build().unwrap();
    hub.metrics().set_speed_factor(2.0);
    let addr = start_server(hub.clone()).await;

    post_event(addr, &position("A", 1)).await;

    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let text = resp.text().await.unwrap();
    assert!(text.contains("positions_processed_total 1"));
    assert!(text.contains("processing_latency_seconds_count 1"));
    assert!(text.contains("messages_published_total 0"));
    assert!(text.contains("connection_errors_total 0"));
    assert!(text.contains("speed_factor 2"));
}

#[tokio::test]
async fn health_reports_subscriber_count() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;
    let _ws = subscribe(&hub, addr).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "ok": true, "subscribers": 1 }));
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/health"))
        .header("origin", "http://dashboard.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn shutdown_closes_websocket_clients() {
    let hub = RelayHub::builder().build().unwrap();
    let addr = start_server(hub.clone()).await;
    let mut ws = subscribe(&hub, addr).await;

    hub.shutdown();

    let next = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    assert!(eventually(|| hub.subscriber_count() == 0).await);
}
