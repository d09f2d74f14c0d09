//! Room registry and connection binding.
//!
//! Owns the code -> room map, the connection -> (room, player) map and
//! every scheduled event (peek countdown, reveal pause, disconnect
//! grace). Timers capture the room's generation counters so a stale
//! timer firing after the room moved on is a no-op.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config;
use crate::game::state::{Phase, Room};
use crate::protocol::{RoomSnapshot, ServerEvent};
use crate::util::normalize_room_code;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Game not found. Please check the code and try again.")]
    NotFound,
    #[error("Game is full (4 players max)")]
    Full,
    #[error("Game already in progress")]
    InProgress,
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
    room_code: String,
    player_id: Uuid,
    tx: UnboundedSender<ServerEvent>,
}

/// Timer durations, injectable so tests can shrink them.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub peek_duration: Duration,
    pub peek_transition: Duration,
    pub reveal_pause: Duration,
    pub disconnect_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            peek_duration: config::PEEK_DURATION,
            peek_transition: config::PEEK_TRANSITION,
            reveal_pause: config::REVEAL_PAUSE,
            disconnect_grace: config::disconnect_grace(),
        }
    }
}

pub struct RoomManager {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    connections: DashMap<Uuid, ConnectionEntry>,
    timings: Timings,
    /// Handle to ourselves for the timer tasks we spawn.
    self_ref: Weak<RoomManager>,
}

#[derive(Debug, Clone)]
pub struct Joined {
    pub room_code: String,
    pub player_id: Uuid,
}

impl RoomManager {
    pub fn new() -> Arc<Self> {
        Self::with_timings(Timings::default())
    }

    pub fn with_timings(timings: Timings) -> Arc<Self> {
        Arc::new_cyclic(|weak| RoomManager {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            timings,
            self_ref: weak.clone(),
        })
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn room(&self, code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(&normalize_room_code(code)).map(|r| r.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Resolve a live connection back to its room and player.
    pub fn connection_info(&self, connection_id: Uuid) -> Option<Joined> {
        self.connections.get(&connection_id).map(|e| Joined {
            room_code: e.room_code.clone(),
            player_id: e.player_id,
        })
    }

    /// Join (or create) a room. A known reconnect token rebinds the
    /// existing player to the new connection; an unknown token seats a
    /// new player, which is only legal in LOBBY.
    pub fn join(
        &self,
        connection_id: Uuid,
        tx: UnboundedSender<ServerEvent>,
        room_code: &str,
        token: &str,
        name: &str,
        character: &str,
        create_new: bool,
    ) -> Result<Joined, RoomError> {
        let code = normalize_room_code(room_code);
        if code.is_empty() {
            return Err(RoomError::NotFound);
        }
        // creation must be atomic: two racing creates for the same code
        // have to land in one room, not replace each other's
        let room_arc = if create_new {
            self.rooms
                .entry(code.clone())
                .or_insert_with(|| {
                    info!(room = %code, "room created");
                    Arc::new(Mutex::new(Room::new(code.clone())))
                })
                .clone()
        } else {
            self.room(&code).ok_or(RoomError::NotFound)?
        };
        let mut room = room_arc.lock();

        let player_id = match room.player_by_token(token) {
            Some(player) => {
                player.connection_id = connection_id;
                player.connected = true;
                if !name.is_empty() {
                    player.name = name.to_string();
                }
                if !character.is_empty() {
                    player.character = character.to_string();
                }
                let id = player.id;
                if room.grace_active && room.all_connected() {
                    room.grace_active = false;
                    debug!(room = %code, "disconnect grace cancelled");
                }
                info!(room = %code, player = %id, "player reconnected");
                id
            }
            None => {
                if room.phase != Phase::Lobby {
                    return Err(RoomError::InProgress);
                }
                if room.players.len() >= config::MAX_PLAYERS {
                    return Err(RoomError::Full);
                }
                let player =
                    room.add_player(connection_id, token.to_string(), name.to_string(), character.to_string());
                info!(room = %code, player = %player.id, name = %player.name, "player joined");
                player.id
            }
        };

        self.connections.insert(
            connection_id,
            ConnectionEntry { room_code: code.clone(), player_id, tx },
        );
        self.broadcast_state(&room);
        Ok(Joined { room_code: code, player_id })
    }

    /// Connection closed: unbind it, mark the player disconnected. In
    /// LOBBY the player leaves outright (and an empty room is dropped);
    /// mid-game a grace timer is armed that destroys the room unless
    /// everyone is back in time.
    pub fn disconnect(&self, connection_id: Uuid) {
        let Some((_, entry)) = self.connections.remove(&connection_id) else {
            return;
        };
        let Some(room_arc) = self.room(&entry.room_code) else {
            return;
        };
        let mut room = room_arc.lock();
        let Some(idx) = room.player_index(entry.player_id) else {
            return;
        };
        // a fast reconnect may already have rebound this player
        if room.players[idx].connection_id != connection_id {
            return;
        }
        room.players[idx].connected = false;
        info!(room = %entry.room_code, player = %entry.player_id, "player disconnected");

        if room.phase == Phase::Lobby {
            room.players.remove(idx);
            if room.players.is_empty() {
                drop(room);
                self.rooms.remove(&entry.room_code);
                info!(room = %entry.room_code, "empty lobby removed");
                return;
            }
        } else if !room.grace_active {
            room.grace_active = true;
            room.grace_epoch += 1;
            self.arm_grace_timer(entry.room_code.clone(), room.grace_epoch);
        }
        self.broadcast_state(&room);
    }

    fn arm_grace_timer(&self, code: String, grace_epoch: u64) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let grace = self.timings.disconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(room_arc) = manager.room(&code) else {
                return;
            };
            let room = room_arc.lock();
            if !room.grace_active || room.grace_epoch != grace_epoch || room.all_connected() {
                return;
            }
            drop(room);
            manager.rooms.remove(&code);
            info!(room = %code, "room abandoned past grace period");
        });
    }

    /// Schedules the PEEKING -> PLAYING transition for the current
    /// epoch. Firing against a redealt or deleted room is a no-op.
    pub fn arm_peek_timer(&self, code: String, epoch: u64) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let delay = self.timings.peek_transition;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(room_arc) = manager.room(&code) else {
                return;
            };
            let mut room = room_arc.lock();
            if room.phase != Phase::Peeking || room.epoch != epoch {
                return;
            }
            room.begin_playing(&mut rand::thread_rng());
            manager.broadcast_state(&room);
        });
    }

    /// Schedules the REVEALING_CARDS -> ROUND_OVER | GAME_OVER step.
    pub fn arm_reveal_timer(&self, code: String, epoch: u64) {
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let delay = self.timings.reveal_pause;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(room_arc) = manager.room(&code) else {
                return;
            };
            let mut room = room_arc.lock();
            if room.phase != Phase::Revealing || room.epoch != epoch {
                return;
            }
            room.finish_reveal();
            manager.broadcast_state(&room);
        });
    }

    /// Redacted full-state broadcast: each connected player gets their
    /// own view.
    pub fn broadcast_state(&self, room: &Room) {
        for p in room.players.iter().filter(|p| p.connected) {
            if let Some(entry) = self.connections.get(&p.connection_id) {
                let _ = entry
                    .tx
                    .send(ServerEvent::GameState(RoomSnapshot::for_viewer(room, p.id)));
            }
        }
    }

    /// Same event to every connected player (chat, match feedback).
    pub fn broadcast_event(&self, room: &Room, event: &ServerEvent) {
        for p in room.players.iter().filter(|p| p.connected) {
            if let Some(entry) = self.connections.get(&p.connection_id) {
                let _ = entry.tx.send(event.clone());
            }
        }
    }

    pub fn send_to_player(&self, room: &Room, player_id: Uuid, event: ServerEvent) {
        if let Some(p) = room.players.iter().find(|p| p.id == player_id) {
            if let Some(entry) = self.connections.get(&p.connection_id) {
                let _ = entry.tx.send(event);
            }
        }
    }
}
