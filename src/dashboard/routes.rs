//! HTTP and WebSocket route handlers (§6, §10.5).
//!
//! Grounded on `betterbot-backend`'s `api/routes.rs` (handler signatures,
//! `Json`/`StatusCode` error style) and `main.rs`'s `websocket_handler`/
//! `handle_socket` pair for the broadcast-fed `/ws/status` loop.

use super::state::{AppState, StatusSnapshot};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.snapshot().await)
}

pub async fn get_pair(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<super::state::PairSnapshot>, StatusCode> {
    let snapshot = state.snapshot().await;
    snapshot
        .pairs
        .into_iter()
        .find(|p| p.symbol == symbol)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
}

pub async fn post_halt(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, StatusCode> {
    state
        .orchestrator
        .halt()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(ControlResponse { status: "halted" }))
}

pub async fn post_resume(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, StatusCode> {
    state
        .orchestrator
        .resume()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(ControlResponse { status: "resumed" }))
}

pub async fn ws_status(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.snapshot_tx.subscribe();

    let initial = state.snapshot().await;
    let msg = serde_json::to_string(&initial).unwrap_or_else(|_| "{}".to_string());
    if socket.send(Message::Text(msg)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            Ok(snapshot) = rx.recv() => {
                let msg = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            Some(Ok(msg)) = socket.recv() => {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
            else => break,
        }
    }
}

pub async fn health() -> impl IntoResponse {
    "ok"
}
