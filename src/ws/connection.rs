//! WebSocket connection lifecycle and event dispatch.
//!
//! One task per socket reads client events; a second forwards queued
//! server events out. All game mutation happens synchronously under the
//! room mutex inside `dispatch`, so events for one room apply in receipt
//! order.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use crate::config;
use crate::game::state::Room;
use crate::http::routes::AppState;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::manager::RoomManager;
use crate::util::{normalize_room_code, now_ms};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch(&state, connection_id, &tx, event),
                Err(err) => {
                    debug!(%connection_id, %err, "malformed message");
                    let _ = tx.send(ServerEvent::Error { message: format!("Bad message: {err}") });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.rooms.disconnect(connection_id);
    send_task.abort();
    debug!(%connection_id, "ws closed");
}

fn dispatch(
    state: &AppState,
    connection_id: Uuid,
    tx: &UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    let manager = &state.rooms;
    match event {
        ClientEvent::JoinGame { room_id, token, name, character, create_new } => {
            let joined = manager.join(
                connection_id,
                tx.clone(),
                &room_id,
                &token,
                &name,
                &character,
                create_new,
            );
            if let Err(err) = joined {
                let _ = tx.send(ServerEvent::Error { message: err.to_string() });
            }
        }
        ClientEvent::StartGame { room_id } => {
            with_room(manager, connection_id, &room_id, |manager, room, player_id| {
                match room.start_game(player_id, &mut rand::thread_rng()) {
                    Ok(()) => start_peek_phase(manager, room),
                    Err(err) => debug!(player = %player_id, %err, "startGame rejected"),
                }
            });
        }
        ClientEvent::PeekCard { room_id, card_index } => {
            with_room(manager, connection_id, &room_id, |manager, room, player_id| {
                match room.peek(player_id, card_index) {
                    Ok(card) => {
                        manager.send_to_player(room, player_id, ServerEvent::PeekResult { card });
                        manager.broadcast_state(room);
                    }
                    Err(err) => debug!(player = %player_id, %err, "peek rejected"),
                }
            });
        }
        ClientEvent::Action { room_id, action } => {
            with_room(manager, connection_id, &room_id, |manager, room, player_id| {
                match room.apply(player_id, action) {
                    Ok(outcome) => {
                        if let Some(feedback) = outcome.match_result {
                            manager.broadcast_event(room, &ServerEvent::MatchResult(feedback));
                        }
                        if let Some(card) = outcome.revealed {
                            manager.send_to_player(
                                room,
                                player_id,
                                ServerEvent::PeekResult { card },
                            );
                        }
                        manager.broadcast_state(room);
                        if outcome.round_ended {
                            manager.arm_reveal_timer(room.code.clone(), room.epoch);
                        }
                    }
                    // illegal actions are a silent no-op
                    Err(err) => debug!(player = %player_id, ?action, %err, "action rejected"),
                }
            });
        }
        ClientEvent::PlayAgain { room_id } => {
            with_room(manager, connection_id, &room_id, |manager, room, player_id| {
                match room.ready(player_id, &mut rand::thread_rng()) {
                    Ok(true) => start_peek_phase(manager, room),
                    Ok(false) => manager.broadcast_state(room),
                    Err(err) => debug!(player = %player_id, %err, "playAgain rejected"),
                }
            });
        }
        ClientEvent::ChatMessage { room_id, message } => {
            let trimmed: String = message.trim().chars().take(config::MAX_CHAT_LEN).collect();
            if trimmed.is_empty() {
                return;
            }
            with_room(manager, connection_id, &room_id, |manager, room, player_id| {
                let Some(name) = room
                    .players
                    .iter()
                    .find(|p| p.id == player_id)
                    .map(|p| p.name.clone())
                else {
                    return;
                };
                manager.broadcast_event(
                    room,
                    &ServerEvent::ChatMessage {
                        player_id,
                        player_name: name,
                        message: trimmed,
                        timestamp_ms: now_ms(),
                    },
                );
            });
        }
    }
}

/// Resolves the connection to its bound room and player, checks the
/// claimed room id, and runs `f` under the room mutex. Unbound
/// connections and mismatched room ids are ignored.
fn with_room<F>(manager: &RoomManager, connection_id: Uuid, room_id: &str, f: F)
where
    F: FnOnce(&RoomManager, &mut Room, Uuid),
{
    let Some(info) = manager.connection_info(connection_id) else {
        debug!(%connection_id, "event from unjoined connection");
        return;
    };
    if info.room_code != normalize_room_code(room_id) {
        debug!(%connection_id, claimed = %room_id, bound = %info.room_code, "room id mismatch");
        return;
    }
    let Some(room_arc) = manager.room(&info.room_code) else {
        return;
    };
    let mut room = room_arc.lock();
    f(manager, &mut room, info.player_id);
}

/// A fresh round was dealt: push state, announce the peek window and
/// arm its expiry for the new epoch.
fn start_peek_phase(manager: &RoomManager, room: &mut Room) {
    manager.broadcast_state(room);
    manager.broadcast_event(
        room,
        &ServerEvent::StartPeek {
            duration: manager.timings().peek_duration.as_millis() as u64,
        },
    );
    manager.arm_peek_timer(room.code.clone(), room.epoch);
}
