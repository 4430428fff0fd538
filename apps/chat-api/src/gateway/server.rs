//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::AppState;

use super::frames::ServerFrame;
use super::router::MessageRouter;
use super::session::{ConnectionSession, CLOSE_IDLE_TIMEOUT};

const BINARY_UNSUPPORTED: &str = "Binary frames are not supported";

/// Missed ping intervals tolerated before a silent connection is dropped.
const IDLE_INTERVALS: u32 = 2;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/chat/{room_name}", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(room_name): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, room_name, state))
}

async fn handle_connection(socket: WebSocket, room_name: String, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();
    let router = MessageRouter::from_state(&state);
    let (mut session, outbound) =
        ConnectionSession::new(state.rooms.clone(), state.config.outbound_buffer);

    if let Err(err) = session.join(&room_name, &router).await {
        tracing::debug!(
            connection_id = %session.connection_id(),
            room = %room_name,
            error = %err,
            "chat connection setup failed"
        );
        let _ = send_close(&mut ws_tx, err.close_code(), &err.to_string()).await;
        return;
    }

    tracing::info!(
        connection_id = %session.connection_id(),
        room = %room_name,
        "chat session joined"
    );

    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    run_session(&session, &router, ws_tx, ws_rx, outbound, ping_interval).await;

    session.close();
    tracing::info!(
        connection_id = %session.connection_id(),
        room = %room_name,
        "chat session ended"
    );
}

/// Main session loop: route client frames one at a time, flush the outbound
/// queue, and keep the connection alive with pings.
async fn run_session(
    session: &ConnectionSession,
    router: &MessageRouter,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut outbound: mpsc::Receiver<Arc<ServerFrame>>,
    ping_interval: Duration,
) {
    let mut ping_timer = time::interval(ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_timer.tick().await; // First tick fires immediately; skip it.
    let idle_limit = ping_interval * IDLE_INTERVALS;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        router.route(session, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        last_seen = Instant::now();
                        session.send(ServerFrame::error(BINARY_UNSUPPORTED));
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id(), "ws read error");
                        break;
                    }
                }
            }

            // Frame queued for this connection by a broadcast or unicast.
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let json = match serde_json::to_string(frame.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(?e, "failed to serialize outbound frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            _ = ping_timer.tick() => {
                if last_seen.elapsed() >= idle_limit {
                    tracing::debug!(
                        connection_id = %session.connection_id(),
                        "idle timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_IDLE_TIMEOUT, "Idle timeout").await;
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
