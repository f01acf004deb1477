//! WebSocket connection handling and the diagnostic HTTP endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    common::time::timestamp_to_rfc3339,
    domain::ConnectionId,
    server::protocol::ClientEvent,
};

use super::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Spawns a task that drains the connection's outbound channel into the
/// WebSocket sink.
///
/// This is the fire-and-forget half of fan-out: the engine pushes into the
/// channel without awaiting the socket, so one slow peer never delays the
/// others.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

/// One connection's lifecycle: register the outbound channel, feed inbound
/// intents to the engine tagged with this connection's id, and signal
/// disconnect to the engine exactly once when the transport closes, whether
/// or not the participant ever sent `leave-room`.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnectionId::generate();
    tracing::info!("Connection '{}' established", conn_id);

    let (tx, rx) = mpsc::unbounded_channel();
    state
        .engine
        .register_connection(conn_id.clone(), tx)
        .await;

    let (sender, mut receiver) = socket.split();

    let conn_id_clone = conn_id.clone();
    let state_clone = state.clone();

    // Task receiving frames from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error on '{}': {}", conn_id_clone, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            tracing::debug!(
                                "Dispatching intent from '{}': {:?}",
                                conn_id_clone,
                                event
                            );
                            state_clone.engine.dispatch(&conn_id_clone, event).await;
                        }
                        Err(e) => {
                            // Malformed intent: dropped, never fatal
                            tracing::warn!(
                                "Unparseable frame from '{}': {} ({})",
                                conn_id_clone,
                                e,
                                text
                            );
                        }
                    }
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping from '{}'", conn_id_clone);
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", conn_id_clone);
                    break;
                }
                _ => {}
            }
        }
    });

    // Task draining the outbound channel into this client's socket
    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Transport closed: apply the leave effect and drop the channel
    state.engine.disconnect(&conn_id).await;
    state.engine.unregister_connection(&conn_id).await;
    tracing::info!("Connection '{}' closed and cleaned up", conn_id);
}

#[derive(Debug, Serialize)]
pub struct RoomSummaryDto {
    pub id: String,
    pub participants: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantDetailDto {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RoomDetailDto {
    pub id: String,
    pub participants: Vec<ParticipantDetailDto>,
    pub language: i64,
    pub created_at: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Get list of active rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let summaries = state.engine.registry().summaries().await;

    let room_summaries: Vec<RoomSummaryDto> = summaries
        .into_iter()
        .map(|room| RoomSummaryDto {
            id: room.id,
            participants: room
                .participants
                .into_iter()
                .map(|p| p.username)
                .collect(),
            created_at: timestamp_to_rfc3339(room.created_at),
        })
        .collect();

    Json(room_summaries)
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let Some(room) = state.engine.registry().summary(&room_id).await else {
        return Err(StatusCode::NOT_FOUND);
    };

    Ok(Json(RoomDetailDto {
        id: room.id,
        participants: room
            .participants
            .into_iter()
            .map(|p| ParticipantDetailDto {
                id: p.id.as_str().to_string(),
                username: p.username,
            })
            .collect(),
        language: room.language,
        created_at: timestamp_to_rfc3339(room.created_at),
    }))
}
