//! Authoritative per-room game state.
//!
//! A `Room` owns every piece of mutable state for one table: seating,
//! piles, turn pointer, phase and the transient mid-turn fields. All
//! mutation goes through here or through the action handlers in
//! [`crate::game::actions`], always under the room's mutex.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config;
use crate::game::cards::{shuffled_deck, Card, Power};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Peeking,
    Playing,
    #[serde(rename = "REVEALING_CARDS")]
    Revealing,
    RoundOver,
    GameOver,
}

/// A card as it sits in a player's hand. `face_up` flips at end-of-round
/// reveal; until then the card's face is private.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct HandCard {
    pub card: Card,
    pub face_up: bool,
}

#[derive(Debug, Clone)]
pub struct Player {
    /// Stable public id, kept across reconnects. This is what action
    /// payloads and snapshots address players by.
    pub id: Uuid,
    /// Volatile transport identity, rebound on every reconnect.
    pub connection_id: Uuid,
    /// Client-supplied reconnect token. Never broadcast to other players.
    pub token: String,
    pub name: String,
    pub character: String,
    pub connected: bool,
    pub hand: Vec<HandCard>,
    pub raw_score: i32,
    pub final_score: i32,
    pub total_score: i32,
}

/// Card held by the acting player pending swap/discard.
#[derive(Debug, Clone, Copy)]
pub struct DrawnCard {
    pub card: Card,
    /// A card taken from the discard pile must be swapped in; it cannot
    /// be dropped back.
    pub from_discard: bool,
}

/// Obligation created by a successful match against an opponent's card:
/// the matcher owes one of their own cards to the player they took from.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Penalty {
    pub from: Uuid,
    pub to: Uuid,
}

/// First half of a two-step SWAP power selection.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTarget {
    pub player_id: Uuid,
    pub card_index: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalRoundReason {
    Kyro,
    ZeroCards,
}

/// Terminal countdown. `turns_remaining` counts completed turns still
/// owed before scoring: a Kyro call owes the caller's current turn plus
/// one per other player; an emptied hand owes one per other player.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRound {
    pub turns_remaining: usize,
    pub triggered_by: Uuid,
    pub reason: FinalRoundReason,
}

/// Most recent visible effect, kept for client-side transient
/// notifications (the client animates off this, then ignores it).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum LastAction {
    Reset,
    CardTransfer {
        from_player_id: Uuid,
        from_card_index: usize,
        to_player_id: Uuid,
        to_card_index: usize,
    },
    CardReplace {
        player_id: Uuid,
        card_index: usize,
    },
    Peek {
        player_id: Uuid,
        card_index: usize,
    },
    Spy {
        spyer_id: Uuid,
        target_id: Uuid,
        card_index: usize,
    },
    PowerSwap {
        first_player_id: Uuid,
        first_index: usize,
        second_player_id: Uuid,
        second_index: usize,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastActionInfo {
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub action: LastAction,
}

impl LastActionInfo {
    pub fn now(action: LastAction) -> Self {
        LastActionInfo { timestamp_ms: crate::util::now_ms(), action }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RoundScore {
    pub raw: i32,
    pub score: i32,
    pub doubled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub scores: HashMap<Uuid, RoundScore>,
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub created_at: OffsetDateTime,
    /// Seating order; index 0 is the host. Mutates only in LOBBY.
    pub players: Vec<Player>,
    pub phase: Phase,
    /// Stock pile; pop from the end to draw.
    pub deck: Vec<Card>,
    /// Face-up pile; the end is the top.
    pub discard_pile: Vec<Card>,
    pub turn_index: usize,
    pub drawn_card: Option<DrawnCard>,
    pub pending_penalty: Option<Penalty>,
    /// At most one match resolution per turn.
    pub matched_this_turn: bool,
    pub active_power: Option<Power>,
    pub swap_selection: Option<SwapTarget>,
    pub kyro_caller: Option<Uuid>,
    pub final_round: Option<FinalRound>,
    pub peeks_remaining: HashMap<Uuid, u8>,
    pub current_round: u32,
    pub round_history: Vec<RoundRecord>,
    pub players_ready: HashSet<Uuid>,
    pub last_round_winner: Option<Uuid>,
    pub game_winner: Option<Uuid>,
    pub last_action: Option<LastActionInfo>,
    /// Bumped on every deal and round end; scheduled timers capture it
    /// and no-op on mismatch.
    pub epoch: u64,
    /// Disconnect-grace bookkeeping: `grace_epoch` invalidates stale
    /// grace timers the same way `epoch` invalidates game timers.
    pub grace_active: bool,
    pub grace_epoch: u64,
}

impl Room {
    pub fn new(code: String) -> Self {
        Room {
            code,
            created_at: OffsetDateTime::now_utc(),
            players: Vec::new(),
            phase: Phase::Lobby,
            deck: Vec::new(),
            discard_pile: Vec::new(),
            turn_index: 0,
            drawn_card: None,
            pending_penalty: None,
            matched_this_turn: false,
            active_power: None,
            swap_selection: None,
            kyro_caller: None,
            final_round: None,
            peeks_remaining: HashMap::new(),
            current_round: 0,
            round_history: Vec::new(),
            players_ready: HashSet::new(),
            last_round_winner: None,
            game_winner: None,
            last_action: None,
            epoch: 0,
            grace_active: false,
            grace_epoch: 0,
        }
    }

    pub fn add_player(
        &mut self,
        connection_id: Uuid,
        token: String,
        name: String,
        character: String,
    ) -> &Player {
        let seat = self.players.len() + 1;
        self.players.push(Player {
            id: Uuid::new_v4(),
            connection_id,
            token,
            name: if name.is_empty() { format!("Player {seat}") } else { name },
            character: if character.is_empty() { "boba.png".to_string() } else { character },
            connected: true,
            hand: Vec::new(),
            raw_score: 0,
            final_score: 0,
            total_score: 0,
        });
        self.players.last().unwrap()
    }

    pub fn player_by_token(&mut self, token: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.token == token)
    }

    pub fn player_index(&self, player_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn player_id_for_connection(&self, connection_id: Uuid) -> Option<Uuid> {
        self.players
            .iter()
            .find(|p| p.connection_id == connection_id)
            .map(|p| p.id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.turn_index)
    }

    pub fn host_id(&self) -> Option<Uuid> {
        self.players.first().map(|p| p.id)
    }

    pub fn all_connected(&self) -> bool {
        self.players.iter().all(|p| p.connected)
    }

    /// Clears per-turn transient fields. Called between turns and on
    /// every redeal.
    pub fn clear_transients(&mut self) {
        self.drawn_card = None;
        self.pending_penalty = None;
        self.matched_this_turn = false;
        self.active_power = None;
        self.swap_selection = None;
    }

    /// Shuffles a fresh deck, flips one card to the discard pile, deals
    /// four face-down cards to every player and enters PEEKING. Running
    /// totals are untouched; callers reset those where the rules say so.
    pub fn deal<R: Rng>(&mut self, rng: &mut R) {
        self.deck = shuffled_deck(rng);
        self.discard_pile.clear();
        if let Some(top) = self.deck.pop() {
            self.discard_pile.push(top);
        }
        self.clear_transients();
        self.kyro_caller = None;
        self.final_round = None;
        self.game_winner = None;
        self.players_ready.clear();
        self.peeks_remaining.clear();
        for p in &mut self.players {
            p.hand.clear();
            for _ in 0..config::HAND_SIZE {
                // Deck construction guarantees enough cards for 4 players.
                if let Some(card) = self.deck.pop() {
                    p.hand.push(HandCard { card, face_up: false });
                }
            }
            p.raw_score = 0;
            p.final_score = 0;
        }
        for id in self.players.iter().map(|p| p.id).collect::<Vec<_>>() {
            self.peeks_remaining.insert(id, config::PEEKS_PER_ROUND);
        }
        self.phase = Phase::Peeking;
        self.last_action = Some(LastActionInfo::now(LastAction::Reset));
        self.epoch += 1;
    }

    /// Total cards in play. 54 at all times once a round has been dealt.
    pub fn card_count(&self) -> usize {
        self.deck.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + usize::from(self.drawn_card.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn room_with_players(n: usize) -> Room {
        let mut room = Room::new("ABCD".to_string());
        for i in 0..n {
            room.add_player(
                Uuid::new_v4(),
                format!("token-{i}"),
                String::new(),
                String::new(),
            );
        }
        room
    }

    #[test]
    fn add_player_assigns_default_names() {
        let room = room_with_players(2);
        assert_eq!(room.players[0].name, "Player 1");
        assert_eq!(room.players[1].name, "Player 2");
    }

    #[test]
    fn deal_preserves_card_conservation() {
        for n in 2..=4 {
            let mut room = room_with_players(n);
            let mut rng = StdRng::seed_from_u64(3);
            room.deal(&mut rng);
            assert_eq!(room.card_count(), 54);
            assert_eq!(room.discard_pile.len(), 1);
            assert_eq!(room.deck.len(), 54 - 1 - n * config::HAND_SIZE);
            for p in &room.players {
                assert_eq!(p.hand.len(), config::HAND_SIZE);
                assert!(p.hand.iter().all(|hc| !hc.face_up));
            }
        }
    }

    #[test]
    fn deal_grants_two_peeks_each_and_enters_peeking() {
        let mut room = room_with_players(3);
        let mut rng = StdRng::seed_from_u64(4);
        room.deal(&mut rng);
        assert_eq!(room.phase, Phase::Peeking);
        for p in &room.players {
            assert_eq!(room.peeks_remaining[&p.id], config::PEEKS_PER_ROUND);
        }
    }

    #[test]
    fn deal_bumps_epoch() {
        let mut room = room_with_players(2);
        let mut rng = StdRng::seed_from_u64(5);
        let before = room.epoch;
        room.deal(&mut rng);
        assert_eq!(room.epoch, before + 1);
    }
}
