//! HTTP surface: health check and a small room summary for debugging.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::game::state::Phase;
use crate::room::manager::RoomManager;

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
}

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub code: String,
    pub phase: Phase,
    pub players: usize,
    pub connected: usize,
    pub current_round: u32,
}

pub async fn room_summary(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoomSummary>, StatusCode> {
    let room_arc = state.rooms.room(&code).ok_or(StatusCode::NOT_FOUND)?;
    let room = room_arc.lock();
    Ok(Json(RoomSummary {
        code: room.code.clone(),
        phase: room.phase,
        players: room.players.len(),
        connected: room.players.iter().filter(|p| p.connected).count(),
        current_round: room.current_round,
    }))
}
