//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::routes::AppError;
use crate::scoring::{SessionHandle, SessionInput};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Existing session to join; a new one is created when absent
    pub session_id: Option<Uuid>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let session = match query.session_id {
        Some(id) => state
            .sessions
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id))),
        None => state.sessions.create().map_err(AppError::from),
    };

    match session {
        Ok(session) => {
            info!(session_id = %session.id, "WebSocket upgrade");
            let rate_limit = state.config.input_rate_limit;
            ws.on_upgrade(move |socket| handle_socket(socket, session, rate_limit))
        }
        Err(e) => {
            error!(error = %e, "WebSocket session lookup failed");
            e.into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: SessionHandle, rate_limit: u32) {
    let connection_id = Uuid::new_v4();
    let _guard = session.connect();
    info!(session_id = %session.id, connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before reading the snapshot so no change slips in between
    let state_rx = session.subscribe();

    let welcome = ServerMsg::Welcome {
        session_id: session.id,
        server_time: unix_millis(),
    };
    let initial = ServerMsg::State {
        snapshot: session.snapshot(),
        delta: None,
    };

    for msg in [welcome, initial] {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            error!(connection_id = %connection_id, error = %e, "Failed to send greeting");
            return;
        }
    }

    run_connection(connection_id, &session, ws_sink, ws_stream, state_rx, rate_limit).await;

    info!(session_id = %session.id, connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket connection with read/write split
async fn run_connection(
    connection_id: Uuid,
    session: &SessionHandle,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut state_rx: broadcast::Receiver<ServerMsg>,
    rate_limit: u32,
) {
    let rate_limiter = ConnectionRateLimiter::new(rate_limit);

    // Replies meant for this connection only (pong, errors)
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(16);

    // Spawn writer task: session broadcasts + direct replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                broadcast = state_rx.recv() => match broadcast {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            connection_id = %connection_id,
                            lagged_count = n,
                            "Client lagged, skipping {} updates", n
                        );
                        // Later updates carry the full snapshot, keep going
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(connection_id = %connection_id, "State channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %connection_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Ping { t }) => {
                        let _ = direct_tx.send(ServerMsg::Pong { t }).await;
                    }
                    Ok(client_msg) => {
                        let input = SessionInput {
                            connection_id,
                            msg: client_msg,
                            received_at: unix_millis(),
                            reply: None,
                        };

                        if session.send(input).await.is_err() {
                            debug!(connection_id = %connection_id, "Session input closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                        let _ = direct_tx
                            .send(ServerMsg::Error {
                                code: "bad_message".to_string(),
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(connection_id = %connection_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(connection_id = %connection_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
