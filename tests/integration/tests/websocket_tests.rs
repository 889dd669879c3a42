//! WebSocket Integration Tests
//!
//! Serves a node over a real socket and talks to it the way a browser would.
//!
//! Run with: cargo test -p integration-tests --test websocket_tests

use futures_util::{SinkExt, StreamExt};
use integration_tests::{token_for, wait_until, TestCluster, RECV_TIMEOUT};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use watch_common::CorsConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn send(socket: &mut Socket, packet: Value) {
    socket.send(Message::Text(packet.to_string())).await.unwrap();
}

/// Read until a packet with `op` arrives
async fn expect_op(socket: &mut Socket, op: u8) -> Value {
    timeout(RECV_TIMEOUT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let packet: Value = serde_json::from_str(&text).unwrap();
                    if packet["op"] == op {
                        return packet;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("socket closed while waiting for op {op}: {other:?}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for op {op}"))
}

#[tokio::test]
async fn test_health_check() {
    let cluster = TestCluster::start(1).await.unwrap();
    let server = cluster.serve(0).await.unwrap();

    let response = reqwest::get(server.http_url("/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_socket_session_lifecycle() {
    let cluster = TestCluster::start(1).await.unwrap();
    let server = cluster.serve(0).await.unwrap();
    let host = cluster.directory.add_user("host");
    let room = cluster.directory.add_room(host, false);

    let (mut socket, _) = connect_async(server.ws_url()).await.unwrap();

    // Garbage and unknown op codes are dropped without closing the socket
    socket.send(Message::Text("not json".to_string())).await.unwrap();
    send(&mut socket, json!({ "op": 250, "d": null })).await;

    send(&mut socket, json!({ "op": 0, "d": { "token": token_for(host) } })).await;
    let authenticated = expect_op(&mut socket, 0).await;
    let session_id = authenticated["d"]["sessionId"].as_str().unwrap().to_string();
    assert!(authenticated["t"].is_i64());

    send(&mut socket, json!({ "op": 2, "d": room })).await;
    let joined = expect_op(&mut socket, 2).await;
    assert_eq!(joined["d"]["status"], 200);
    assert_eq!(joined["d"]["room"]["id"], json!(room));

    let node = cluster.node(0);
    assert!(node.clients().get(&session_id).is_some());

    socket.close(None).await.unwrap();
    assert!(wait_until(|| node.clients().get(&session_id).is_none()).await);
    assert!(wait_until(|| node.rooms().get(room).is_none()).await);
}

#[tokio::test]
async fn test_dropped_socket_is_released() {
    let cluster = TestCluster::start(1).await.unwrap();
    let server = cluster.serve(0).await.unwrap();
    let host = cluster.directory.add_user("host");
    let room = cluster.directory.add_room(host, false);

    let (mut socket, _) = connect_async(server.ws_url()).await.unwrap();
    send(&mut socket, json!({ "op": 0, "d": { "token": token_for(host) } })).await;
    let authenticated = expect_op(&mut socket, 0).await;
    let session_id = authenticated["d"]["sessionId"].as_str().unwrap().to_string();
    send(&mut socket, json!({ "op": 2, "d": room })).await;
    expect_op(&mut socket, 2).await;

    // No close handshake, so closing the server side of the socket fails
    drop(socket);

    let node = cluster.node(0);
    assert!(wait_until(|| node.clients().get(&session_id).is_none()).await);
    assert!(wait_until(|| node.rooms().get(room).is_none()).await);
}

#[tokio::test]
async fn test_failed_authentication_closes_socket() {
    let cluster = TestCluster::start(1).await.unwrap();
    let server = cluster.serve(0).await.unwrap();

    let (mut socket, _) = connect_async(server.ws_url()).await.unwrap();
    send(&mut socket, json!({ "op": 0, "d": { "token": "Bearer forged" } })).await;

    let closed = timeout(RECV_TIMEOUT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(closed);
}

#[tokio::test]
async fn test_disallowed_origin_is_rejected() {
    let cors = CorsConfig {
        allowed_origins: vec!["https://watch.example".to_string()],
    };
    let cluster = TestCluster::start_with(1, cors).await.unwrap();
    let server = cluster.serve(0).await.unwrap();

    let mut request = server.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://evil.example"));
    assert!(connect_async(request).await.is_err());

    let mut request = server.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("https://watch.example"));
    assert!(connect_async(request).await.is_ok());
}
