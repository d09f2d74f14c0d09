//! Wire types: client/server events and the per-viewer room snapshot.
//!
//! Snapshots are redacted per recipient: a hand card's face is only
//! serialized once it is face up (end-of-round reveal). Private reveals
//! travel as unicast `peekResult` events instead. Reconnect tokens are
//! echoed only to their owner.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::actions::{Action, MatchFeedback};
use crate::game::cards::{Card, Power};
use crate::game::state::{
    FinalRound, LastActionInfo, Penalty, Phase, Player, Room, RoundRecord, SwapTarget,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinGame {
        room_id: String,
        token: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        character: String,
        #[serde(default)]
        create_new: bool,
    },
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: String },
    #[serde(rename_all = "camelCase")]
    PeekCard { room_id: String, card_index: usize },
    #[serde(rename_all = "camelCase")]
    Action { room_id: String, action: Action },
    #[serde(rename_all = "camelCase")]
    PlayAgain { room_id: String },
    #[serde(rename_all = "camelCase")]
    ChatMessage { room_id: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    GameState(RoomSnapshot),
    #[serde(rename_all = "camelCase")]
    StartPeek { duration: u64 },
    #[serde(rename_all = "camelCase")]
    PeekResult { card: Card },
    MatchResult(MatchFeedback),
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        player_id: Uuid,
        player_name: String,
        message: String,
        timestamp_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// One hand slot as a viewer sees it. `card` is null while the card is
/// concealed; the slot itself stays so index addressing keeps working.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandCardView {
    pub card: Option<Card>,
    pub face_up: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: Uuid,
    /// The viewer's own reconnect token; absent on other players.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub name: String,
    pub character: String,
    pub connected: bool,
    pub hand: Vec<HandCardView>,
    pub raw_score: i32,
    pub final_score: i32,
    pub total_score: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub you: Uuid,
    pub players: Vec<PlayerView>,
    pub phase: Phase,
    pub deck_count: usize,
    pub discard_pile: Vec<Card>,
    pub turn_index: usize,
    pub has_drawn_card: bool,
    /// Present for the holder, and for everyone when the card came off
    /// the discard pile (its face is already public).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawn_card: Option<Card>,
    pub drawn_from_discard: bool,
    pub active_power: Option<Power>,
    pub pending_penalty: Option<Penalty>,
    pub matched_this_turn: bool,
    pub swap_selection: Option<SwapTarget>,
    pub kyro_caller_id: Option<Uuid>,
    pub final_round: Option<FinalRound>,
    pub peeks_remaining: HashMap<Uuid, u8>,
    pub current_round: u32,
    pub round_history: Vec<RoundRecord>,
    pub players_ready: Vec<Uuid>,
    pub last_round_winner: Option<Uuid>,
    pub game_winner: Option<Uuid>,
    pub last_action: Option<LastActionInfo>,
}

fn player_view(p: &Player, viewer: Uuid) -> PlayerView {
    let own = p.id == viewer;
    PlayerView {
        id: p.id,
        token: own.then(|| p.token.clone()),
        name: p.name.clone(),
        character: p.character.clone(),
        connected: p.connected,
        hand: p
            .hand
            .iter()
            .map(|hc| HandCardView {
                card: hc.face_up.then_some(hc.card),
                face_up: hc.face_up,
            })
            .collect(),
        raw_score: p.raw_score,
        final_score: p.final_score,
        total_score: p.total_score,
    }
}

impl RoomSnapshot {
    pub fn for_viewer(room: &Room, viewer: Uuid) -> Self {
        let holder = room
            .current_player()
            .map(|p| p.id == viewer)
            .unwrap_or(false);
        let drawn_from_discard = room
            .drawn_card
            .map(|d| d.from_discard)
            .unwrap_or(false);
        let drawn_card = room
            .drawn_card
            .filter(|d| holder || d.from_discard)
            .map(|d| d.card);
        RoomSnapshot {
            id: room.code.clone(),
            you: viewer,
            players: room.players.iter().map(|p| player_view(p, viewer)).collect(),
            phase: room.phase,
            deck_count: room.deck.len(),
            discard_pile: room.discard_pile.clone(),
            turn_index: room.turn_index,
            has_drawn_card: room.drawn_card.is_some(),
            drawn_card,
            drawn_from_discard,
            active_power: room.active_power,
            pending_penalty: room.pending_penalty,
            matched_this_turn: room.matched_this_turn,
            swap_selection: room.swap_selection,
            kyro_caller_id: room.kyro_caller,
            final_round: room.final_round,
            peeks_remaining: room.peeks_remaining.clone(),
            current_round: room.current_round,
            round_history: room.round_history.clone(),
            players_ready: room.players_ready.iter().copied().collect(),
            last_round_winner: room.last_round_winner,
            game_winner: room.game_winner,
            last_action: room.last_action,
        }
    }
}
