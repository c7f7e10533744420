//! Per-connection WebSocket plumbing. The read loop processes one inbound
//! event at a time, so events for a session are handled strictly in arrival
//! order; only the scorer tasks spawned by the controller run alongside it.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use questline_core::events::{decode_client_event, ClientEvent, ServerEvent};
use questline_core::ids::{PlayerId, SessionId};
use questline_engine::EngineError;

use crate::server::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drive one authenticated WebSocket connection until it closes or a fatal
/// error tears it down.
pub async fn handle_socket(
    socket: WebSocket,
    session_id: SessionId,
    player_id: PlayerId,
    state: AppState,
) {
    let (tx, rx) = mpsc::channel::<String>(state.max_send_queue);

    if let Err(e) = state.registry.connect(session_id.clone(), tx) {
        // No silent overwrite: refuse the second channel outright.
        warn!(session_id = %session_id, error = %e, "refusing duplicate connection");
        let mut socket = socket;
        if let Ok(payload) = serde_json::to_string(&ServerEvent::Error {
            message: e.to_string(),
        }) {
            let _ = socket.send(WsMessage::Text(payload.into())).await;
        }
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }

    info!(session_id = %session_id, player_id = %player_id, "quiz channel connected");

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, rx));

    read_loop(ws_rx, &session_id, &player_id, &state).await;

    // Dropping the registry entry drops the sender, which ends the writer.
    state.registry.disconnect(&session_id);
    let _ = writer.await;
    info!(session_id = %session_id, "quiz channel closed");
}

/// Forward outbound events to the socket and keep the connection warm with
/// periodic pings.
async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping_interval.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    session_id: &SessionId,
    player_id: &PlayerId,
    state: &AppState,
) {
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            WsMessage::Text(text) => {
                let event = match decode_client_event(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        // Malformed frame: surface and keep the channel alive.
                        warn!(session_id = %session_id, error = %e, "malformed inbound event");
                        state.registry.send(
                            session_id,
                            &ServerEvent::Error {
                                message: format!("invalid event: {e}"),
                            },
                        );
                        continue;
                    }
                };

                if let Err(e) = dispatch(state, player_id, session_id, event).await {
                    state.registry.send(
                        session_id,
                        &ServerEvent::Error {
                            message: e.to_string(),
                        },
                    );
                    if e.is_fatal() {
                        error!(session_id = %session_id, error = %e, "fatal error, tearing down connection");
                        break;
                    }
                    warn!(session_id = %session_id, error = %e, "event failed, connection kept alive");
                }
            }
            WsMessage::Close(_) => break,
            // axum answers pings automatically; pongs need no bookkeeping here.
            _ => {}
        }
    }
}

async fn dispatch(
    state: &AppState,
    player_id: &PlayerId,
    session_id: &SessionId,
    event: ClientEvent,
) -> Result<(), EngineError> {
    match event {
        ClientEvent::StartQuest { quest_id } => {
            state
                .controller
                .start_quest(player_id, session_id, &quest_id)
                .await
        }
        ClientEvent::SubmitAnswer {
            answer,
            question_index,
        } => {
            state
                .controller
                .submit_answer(player_id, session_id, answer, question_index)
                .await
        }
        ClientEvent::RequestResult {} => {
            state.controller.request_result(player_id, session_id).await
        }
    }
}
