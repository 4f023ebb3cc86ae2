use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{Topic, TopicParseError};
use tracing::{debug, error, info};

use crate::api::AppState;
use crate::hub::{BroadcastHub, ConnectionId};

/// Control frame a console sends over the socket. One connection carries
/// any number of topic subscriptions.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ControlFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (conn, mut deltas) = state.hub.connect();
    info!("subscriber connected: {}", conn);

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlFrame>(&text) {
                            Ok(frame) => {
                                // Either action can carry a bad topic key;
                                // both get the same error frame back.
                                if let Err(e) = apply_control(&state.hub, conn, frame) {
                                    let frame = serde_json::json!({ "error": e.to_string() });
                                    if ws_tx.send(Message::Text(frame.to_string())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => debug!("unrecognized frame from {}: {}", conn, e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        error!("websocket error on {}: {}", conn, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            delta = deltas.recv() => {
                let Some(delta) = delta else { break };
                match serde_json::to_string(&delta) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("failed to serialize delta for {}: {}", conn, e),
                }
            }
        }
    }

    // Closing the connection cancels its pending deliveries; nothing else
    // is owed to the hub.
    state.hub.disconnect(conn);
    info!("subscriber disconnected: {}", conn);
}

fn apply_control(
    hub: &BroadcastHub,
    conn: ConnectionId,
    frame: ControlFrame,
) -> Result<(), TopicParseError> {
    match frame {
        ControlFrame::Subscribe { topic } => {
            let topic: Topic = topic.parse()?;
            hub.subscribe(conn, topic);
            debug!("{} subscribed to {}", conn, topic);
        }
        ControlFrame::Unsubscribe { topic } => {
            let topic: Topic = topic.parse()?;
            hub.unsubscribe(conn, topic);
            debug!("{} unsubscribed from {}", conn, topic);
        }
    }
    Ok(())
}
