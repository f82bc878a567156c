//! WebSocket handler for real-time updates.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use matoswim_core::{Reading, TrackerSnapshot};

use crate::state::AppState;

/// Message pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsEvent {
    /// State at connection time.
    Snapshot(TrackerSnapshot),
    /// A newly accepted reading.
    Reading(Reading),
}

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no reading falls in between.
    let mut rx = state.poller().subscribe();

    info!("WebSocket client connected");

    let snapshot = WsEvent::Snapshot(state.tracker().lock().await.snapshot());
    if let Ok(json) = serde_json::to_string(&snapshot)
        && sender.send(Message::Text(json.into())).await.is_err()
    {
        info!("WebSocket client disconnected during initial snapshot");
        return;
    }

    debug!("Sent initial snapshot to WebSocket client");

    let mut send_task = tokio::spawn(async move {
        loop {
            let reading = match rx.recv().await {
                Ok(reading) => reading,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging, skipped {} readings", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&WsEvent::Reading(reading)) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize reading: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client disconnected");
}
