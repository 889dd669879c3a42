//! WebSocket handler
//!
//! Each socket runs four tasks: a reader, a packet worker fed by the reader, a
//! writer draining the connection's outbound queue, and a keepalive ticker. All of
//! them stop when the connection's cancellation token fires; the disconnect
//! cleanup then runs under the gateway-wide scope.

use crate::connection::{Connection, Frame, Session};
use crate::protocol::{OpCode, Packet};
use crate::server::GatewayState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Outbound frames buffered per connection before fanout starts dropping
const OUTBOUND_BUFFER_SIZE: usize = 256;

/// Shortest keepalive check period
const MIN_KEEPALIVE_TICK: Duration = Duration::from_millis(100);

/// WebSocket gateway handler
pub async fn gateway_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if !state.cors().allows(origin) {
        tracing::warn!(origin = ?origin, "Rejected socket upgrade from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Handle an upgraded WebSocket connection
async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
    let conn = Connection::with_cancellation(
        Session::anonymous(state.node_id()),
        tx,
        state.shutdown_token().child_token(),
    );
    state.clients().add(&conn);

    tracing::info!(session_id = %conn.session_id(), connection_id = %conn.id(), "WebSocket connection established");

    let (sink, stream) = socket.split();
    let (packet_tx, packet_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_loop(conn.clone(), sink, rx));
    let worker = tokio::spawn(packet_loop(state.clone(), conn.clone(), packet_rx));
    let keepalive = tokio::spawn(keepalive_loop(
        conn.clone(),
        state.session_config().keepalive_interval(),
        state.session_config().keepalive_timeout(),
    ));

    read_loop(&conn, stream, packet_tx).await;

    conn.disconnect();
    if let Err(err) = worker.await {
        tracing::error!(session_id = %conn.session_id(), error = %err, "Packet worker panicked");
    }
    keepalive.abort();

    state
        .handlers()
        .handle(&state, &conn, &Packet::empty(OpCode::Disconnect))
        .await;

    if let Err(err) = writer.await {
        tracing::error!(session_id = %conn.session_id(), error = %err, "Writer panicked");
    }

    tracing::info!(
        session_id = %conn.session_id(),
        connection_id = %conn.id(),
        age_ms = conn.age().as_millis(),
        "WebSocket connection closed"
    );
}

/// Read frames until the socket closes or the connection is cancelled
///
/// Any inbound frame counts as activity. Malformed and unknown packets are dropped.
async fn read_loop(
    conn: &Connection,
    mut stream: SplitStream<WebSocket>,
    packets: mpsc::UnboundedSender<Packet>,
) {
    let cancel = conn.cancellation().clone();

    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = stream.next() => message,
        };

        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::debug!(session_id = %conn.session_id(), error = %err, "WebSocket error");
                break;
            }
            None => break,
        };
        conn.touch();

        match message {
            WsMessage::Text(text) => match Packet::decode(&text) {
                Ok(Some(packet)) => {
                    if packets.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::trace!(session_id = %conn.session_id(), "Ignoring unknown op code");
                }
                Err(err) => {
                    tracing::debug!(session_id = %conn.session_id(), error = %err, "Ignoring malformed packet");
                }
            },
            WsMessage::Binary(_) => {
                tracing::debug!(session_id = %conn.session_id(), "Binary frames not supported");
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                tracing::debug!(session_id = %conn.session_id(), "Client closed connection");
                break;
            }
        }
    }
}

/// Handle packets one at a time, in arrival order
async fn packet_loop(state: GatewayState, conn: Arc<Connection>, mut packets: mpsc::UnboundedReceiver<Packet>) {
    let cancel = conn.cancellation().clone();

    loop {
        let packet = tokio::select! {
            () = cancel.cancelled() => break,
            packet = packets.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        tracing::trace!(session_id = %conn.session_id(), op = %packet.op, "Received packet");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = state.handlers().handle_client(&state, &conn, &packet) => {}
        }
    }
}

/// Write queued frames to the socket
///
/// Frames already queued when the connection is cancelled are still flushed, so
/// an error report sent right before a disconnect reaches the client.
async fn write_loop(
    conn: Arc<Connection>,
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut frames: mpsc::Receiver<Frame>,
) {
    let cancel = conn.cancellation().clone();

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        if !write_frame(&conn, &mut sink, frame).await {
            conn.disconnect();
            return;
        }
    }

    while let Ok(frame) = frames.try_recv() {
        if !write_frame(&conn, &mut sink, frame).await {
            return;
        }
    }
    if let Err(err) = sink.close().await {
        tracing::debug!(session_id = %conn.session_id(), error = %err, "Failed to close socket");
    }
}

async fn write_frame(conn: &Connection, sink: &mut SplitSink<WebSocket, WsMessage>, frame: Frame) -> bool {
    let message = match frame {
        Frame::Packet(packet) => match packet.to_json() {
            Ok(json) => WsMessage::Text(json),
            Err(err) => {
                tracing::warn!(session_id = %conn.session_id(), op = %packet.op, error = %err, "Failed to encode packet");
                return true;
            }
        },
        Frame::Ping => WsMessage::Ping(Vec::new()),
    };

    match sink.send(message).await {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(session_id = %conn.session_id(), error = %err, "Failed to write to socket");
            false
        }
    }
}

/// Ping idle sockets and close silent ones
async fn keepalive_loop(conn: Arc<Connection>, ping_after: Duration, close_after: Duration) {
    let cancel = conn.cancellation().clone();
    let mut ticker = interval((ping_after / 2).max(MIN_KEEPALIVE_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let idle = conn.idle_for();
        if idle >= close_after {
            tracing::info!(
                session_id = %conn.session_id(),
                idle_ms = idle.as_millis(),
                "Connection timed out"
            );
            conn.disconnect();
            break;
        }
        if idle >= ping_after && !conn.ping() {
            tracing::debug!(session_id = %conn.session_id(), "Failed to queue keepalive ping");
        }
    }
}
