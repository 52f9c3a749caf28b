//! WebSocket transport for the lesson relay.
//!
//! Each socket runs one task that multiplexes three sources:
//!
//! - inbound text frames, decoded as [`ClientEvent`] and handed to the hub
//! - the connection's outbound queue, filled by the hub
//! - a heartbeat ping with a missed-pong limit
//!
//! Every socket write is bounded by the heartbeat interval. A peer that stops
//! reading is closed instead of letting its outbound queue back up.
//!
//! Whatever ends the loop, the hub hears about it through
//! [`LessonHub::disconnect`](crate::hub::LessonHub::disconnect).

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};
use crate::error::Result;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity::{ConnectParams, Identity};
use crate::relay::outbound_queue;

/// Handler for `GET /ws`.
///
/// Refuses the upgrade with `401` when the gateway parameters do not resolve
/// to an identity.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.identity.identify(&params) {
        Ok(identity) => {
            info!(user_id = %identity.user_id, role = %identity.role, "WebSocket upgrade accepted");
            ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
        }
        Err(err) => {
            warn!(error = %err, "WebSocket upgrade refused");
            ApiError::from(err).into_response()
        }
    }
}

/// Decodes one inbound text frame.
fn decode(text: &str) -> Result<ClientEvent> {
    Ok(serde_json::from_str(text)?)
}

/// Writes one frame. Returns `false` once the peer is gone or has not
/// accepted the frame within `limit`.
async fn write(sink: &mut SplitSink<WebSocket, Message>, msg: Message, limit: Duration) -> bool {
    match timeout(limit, sink.send(msg)).await {
        Ok(result) => result.is_ok(),
        Err(_) => {
            warn!(limit_secs = limit.as_secs(), "Socket write timed out");
            false
        }
    }
}

/// Writes an event to the socket. Returns `false` once the peer is gone.
async fn forward(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
    limit: Duration,
) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(event = event.event_name(), error = %e, "Failed to serialize event");
            return true;
        }
    };
    write(sink, Message::Text(json), limit).await
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = outbound_queue();
    let connection = state.hub.connect(identity, tx).await;

    let period = state.config.heartbeat_interval();
    let max_missed_pongs = state.config.max_missed_pongs;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    let mut missed_pongs = 0u32;

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match decode(&text) {
                        Ok(event) => {
                            debug!(connection_id = %connection, event = event.event_name(), "Received event");
                            state.hub.handle(connection, event).await;
                        }
                        Err(err) => {
                            debug!(connection_id = %connection, error = %err, "Undecodable frame");
                            if !forward(&mut sink, &ServerEvent::error(&err), period).await {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if !write(&mut sink, Message::Pong(data), period).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(connection_id = %connection, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection_id = %connection, "Client requested close");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %connection, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }

            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if !forward(&mut sink, &event, period).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if missed_pongs >= max_missed_pongs {
                    info!(connection_id = %connection, missed_pongs, "Closing unresponsive connection");
                    break;
                }
                if !write(&mut sink, Message::Ping(Vec::new()), period).await {
                    break;
                }
                missed_pongs += 1;
            }
        }
    }

    state.hub.disconnect(connection).await;
}

// ============================================================================
// Tests
// ============================================================================
