//! Turn/phase state machine: validates player actions against the room
//! and applies their effects.
//!
//! Every handler validates fully before touching state, so an illegal
//! action leaves the room exactly as it was. The transport layer treats
//! `Err` as a silent no-op (logged at debug, nothing broadcast).

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::game::cards::{Card, Power};
use crate::game::scoring;
use crate::game::state::{
    DrawnCard, FinalRound, FinalRoundReason, HandCard, LastAction, LastActionInfo, Penalty, Phase,
    Room, RoundRecord, RoundScore, SwapTarget,
};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    #[error("action not valid in the current phase")]
    WrongPhase,
    #[error("not this player's turn")]
    NotYourTurn,
    #[error("unknown player or card index")]
    InvalidTarget,
    #[error("action unavailable right now")]
    Unavailable,
    #[error("only the host can start the game")]
    NotHost,
    #[error("at least two players are required")]
    NotEnoughPlayers,
}

/// In-turn player action, in wire form: `{ "type": ..., "payload": ... }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    CallKyro,
    #[serde(rename_all = "camelCase")]
    AttemptMatch { target_owner_id: Uuid, card_index: usize },
    #[serde(rename_all = "camelCase")]
    GiveCard { hand_index: usize },
    DrawStock,
    DrawDiscard,
    #[serde(rename_all = "camelCase")]
    SwapCard { hand_index: usize },
    DiscardDrawn,
    #[serde(rename_all = "camelCase")]
    UsePower { target_player_id: Uuid, card_index: usize },
    FinishPower,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct MatchFeedback {
    pub success: bool,
    pub msg: &'static str,
}

/// Side effects the transport layer must carry out after an action.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// Card to reveal to the acting player only (peeks and spy powers).
    pub revealed: Option<Card>,
    pub match_result: Option<MatchFeedback>,
    /// The round just ended; the caller schedules the reveal pause.
    pub round_ended: bool,
}

impl Room {
    /// Host-only LOBBY -> PEEKING transition: zeroes totals, deals a
    /// fresh round.
    pub fn start_game<R: Rng>(&mut self, actor: Uuid, rng: &mut R) -> Result<(), ActionError> {
        if self.phase != Phase::Lobby {
            return Err(ActionError::WrongPhase);
        }
        if self.host_id() != Some(actor) {
            return Err(ActionError::NotHost);
        }
        if self.players.len() < config::MIN_PLAYERS {
            return Err(ActionError::NotEnoughPlayers);
        }
        for p in &mut self.players {
            p.total_score = 0;
        }
        self.current_round = 0;
        self.round_history.clear();
        self.last_round_winner = None;
        self.deal(rng);
        Ok(())
    }

    /// PEEKING -> PLAYING, fired by the peek timer. The previous round's
    /// winner takes the first turn; random when there is none.
    pub fn begin_playing<R: Rng>(&mut self, rng: &mut R) {
        if self.phase != Phase::Peeking || self.players.is_empty() {
            return;
        }
        self.phase = Phase::Playing;
        self.turn_index = self
            .last_round_winner
            .and_then(|id| self.player_index(id))
            .unwrap_or_else(|| rng.gen_range(0..self.players.len()));
    }

    /// Private setup peek: each player may look at up to two of their own
    /// cards during the peek window.
    pub fn peek(&mut self, player_id: Uuid, card_index: usize) -> Result<Card, ActionError> {
        if self.phase != Phase::Peeking {
            return Err(ActionError::WrongPhase);
        }
        let remaining = self
            .peeks_remaining
            .get(&player_id)
            .copied()
            .ok_or(ActionError::InvalidTarget)?;
        if remaining == 0 {
            return Err(ActionError::Unavailable);
        }
        let idx = self.player_index(player_id).ok_or(ActionError::InvalidTarget)?;
        let card = self.players[idx]
            .hand
            .get(card_index)
            .map(|hc| hc.card)
            .ok_or(ActionError::InvalidTarget)?;
        self.peeks_remaining.insert(player_id, remaining - 1);
        Ok(card)
    }

    /// Opt into the next round; redeals once every connected player is
    /// ready. Returns true when a new round started.
    pub fn ready<R: Rng>(&mut self, player_id: Uuid, rng: &mut R) -> Result<bool, ActionError> {
        if self.phase != Phase::RoundOver && self.phase != Phase::GameOver {
            return Err(ActionError::WrongPhase);
        }
        if self.player_index(player_id).is_none() {
            return Err(ActionError::InvalidTarget);
        }
        self.players_ready.insert(player_id);
        let all_ready = self
            .players
            .iter()
            .filter(|p| p.connected)
            .all(|p| self.players_ready.contains(&p.id));
        if !all_ready {
            return Ok(false);
        }
        if self.phase == Phase::GameOver {
            for p in &mut self.players {
                p.total_score = 0;
            }
            self.current_round = 0;
            self.round_history.clear();
            self.last_round_winner = None;
        }
        self.deal(rng);
        Ok(true)
    }

    /// Validates and applies one in-turn action.
    pub fn apply(&mut self, player_id: Uuid, action: Action) -> Result<Outcome, ActionError> {
        if self.phase != Phase::Playing {
            return Err(ActionError::WrongPhase);
        }
        let actor_idx = self.player_index(player_id).ok_or(ActionError::InvalidTarget)?;

        // A call may not be made while holding a card or owing a penalty,
        // and only one countdown can be live.
        if let Action::CallKyro = action {
            if self.turn_index != actor_idx {
                return Err(ActionError::NotYourTurn);
            }
            if self.drawn_card.is_some()
                || self.pending_penalty.is_some()
                || self.final_round.is_some()
            {
                return Err(ActionError::Unavailable);
            }
            self.kyro_caller = Some(player_id);
            self.final_round = Some(FinalRound {
                // the caller's current turn plus one per other player
                turns_remaining: self.players.len(),
                triggered_by: player_id,
                reason: FinalRoundReason::Kyro,
            });
            return Ok(Outcome::default());
        }

        if self.turn_index != actor_idx {
            return Err(ActionError::NotYourTurn);
        }

        match action {
            Action::CallKyro => unreachable!("handled above"),
            Action::AttemptMatch { target_owner_id, card_index } => {
                self.attempt_match(player_id, target_owner_id, card_index)
            }
            Action::GiveCard { hand_index } => self.give_penalty_card(player_id, hand_index),
            Action::DrawStock => self.draw_stock(),
            Action::DrawDiscard => self.draw_discard(),
            Action::SwapCard { hand_index } => self.swap_drawn(player_id, hand_index),
            Action::DiscardDrawn => self.discard_drawn(),
            Action::UsePower { target_player_id, card_index } => {
                self.use_power(player_id, target_player_id, card_index)
            }
            Action::FinishPower => self.finish_power(),
        }
    }

    fn attempt_match(
        &mut self,
        actor: Uuid,
        target_owner_id: Uuid,
        card_index: usize,
    ) -> Result<Outcome, ActionError> {
        if self.matched_this_turn || self.pending_penalty.is_some() {
            return Err(ActionError::Unavailable);
        }
        let top_rank = self
            .discard_pile
            .last()
            .map(|c| c.rank)
            .ok_or(ActionError::Unavailable)?;
        let target_idx = self.player_index(target_owner_id).ok_or(ActionError::InvalidTarget)?;
        let target_card = self.players[target_idx]
            .hand
            .get(card_index)
            .map(|hc| hc.card)
            .ok_or(ActionError::InvalidTarget)?;

        let mut outcome = Outcome::default();
        if target_card.rank == top_rank {
            self.matched_this_turn = true;
            self.players[target_idx].hand.remove(card_index);
            self.discard_pile.push(target_card);
            if target_owner_id != actor {
                // the matcher owes a card to the player they took from
                self.pending_penalty = Some(Penalty { from: actor, to: target_owner_id });
            }
            outcome.match_result = Some(MatchFeedback { success: true, msg: "SNAP!" });
        } else if let Some(penalty_card) = self.deck.pop() {
            let actor_idx = self.player_index(actor).ok_or(ActionError::InvalidTarget)?;
            self.players[actor_idx]
                .hand
                .push(HandCard { card: penalty_card, face_up: false });
            outcome.match_result = Some(MatchFeedback { success: false, msg: "FAIL! +1 CARD" });
        }
        Ok(outcome)
    }

    fn give_penalty_card(&mut self, actor: Uuid, hand_index: usize) -> Result<Outcome, ActionError> {
        let penalty = self.pending_penalty.ok_or(ActionError::Unavailable)?;
        if penalty.from != actor {
            return Err(ActionError::Unavailable);
        }
        let from_idx = self.player_index(penalty.from).ok_or(ActionError::InvalidTarget)?;
        let to_idx = self.player_index(penalty.to).ok_or(ActionError::InvalidTarget)?;
        if hand_index >= self.players[from_idx].hand.len() {
            return Err(ActionError::InvalidTarget);
        }
        let mut given = self.players[from_idx].hand.remove(hand_index);
        given.face_up = false;
        let to_card_index = self.players[to_idx].hand.len();
        self.players[to_idx].hand.push(given);
        self.last_action = Some(LastActionInfo::now(LastAction::CardTransfer {
            from_player_id: penalty.from,
            from_card_index: hand_index,
            to_player_id: penalty.to,
            to_card_index,
        }));
        // resolving the penalty does not consume the main action
        self.pending_penalty = None;
        Ok(Outcome::default())
    }

    fn draw_stock(&mut self) -> Result<Outcome, ActionError> {
        if self.pending_penalty.is_some()
            || self.drawn_card.is_some()
            || self.active_power.is_some()
        {
            return Err(ActionError::Unavailable);
        }
        let mut outcome = Outcome::default();
        match self.deck.pop() {
            Some(card) => {
                self.drawn_card = Some(DrawnCard { card, from_discard: false });
                if self.deck.is_empty() {
                    self.end_round();
                    outcome.round_ended = true;
                }
            }
            // stock exhausted: the round ends instead of failing
            None => {
                self.end_round();
                outcome.round_ended = true;
            }
        }
        Ok(outcome)
    }

    fn draw_discard(&mut self) -> Result<Outcome, ActionError> {
        if self.pending_penalty.is_some()
            || self.drawn_card.is_some()
            || self.active_power.is_some()
        {
            return Err(ActionError::Unavailable);
        }
        // a discard draw must be swapped in; with no hand slot to swap
        // into the card could never be resolved and the turn would hang
        if self
            .players
            .get(self.turn_index)
            .map_or(true, |p| p.hand.is_empty())
        {
            return Err(ActionError::Unavailable);
        }
        let card = self.discard_pile.pop().ok_or(ActionError::Unavailable)?;
        self.drawn_card = Some(DrawnCard { card, from_discard: true });
        Ok(Outcome::default())
    }

    fn swap_drawn(&mut self, actor: Uuid, hand_index: usize) -> Result<Outcome, ActionError> {
        if self.pending_penalty.is_some() {
            return Err(ActionError::Unavailable);
        }
        let drawn = self.drawn_card.ok_or(ActionError::Unavailable)?;
        let actor_idx = self.player_index(actor).ok_or(ActionError::InvalidTarget)?;
        let slot = self.players[actor_idx]
            .hand
            .get_mut(hand_index)
            .ok_or(ActionError::InvalidTarget)?;
        let old = slot.card;
        slot.card = drawn.card;
        slot.face_up = false;
        self.discard_pile.push(old);
        self.drawn_card = None;
        self.last_action = Some(LastActionInfo::now(LastAction::CardReplace {
            player_id: actor,
            card_index: hand_index,
        }));
        Ok(self.finish_turn())
    }

    fn discard_drawn(&mut self) -> Result<Outcome, ActionError> {
        if self.pending_penalty.is_some() {
            return Err(ActionError::Unavailable);
        }
        let drawn = self.drawn_card.ok_or(ActionError::Unavailable)?;
        if drawn.from_discard {
            // a card taken from the discard pile must be swapped in
            return Err(ActionError::Unavailable);
        }
        self.discard_pile.push(drawn.card);
        self.drawn_card = None;
        match drawn.card.power() {
            Some(power) => {
                self.active_power = Some(power);
                Ok(Outcome::default())
            }
            None => Ok(self.finish_turn()),
        }
    }

    fn use_power(
        &mut self,
        actor: Uuid,
        target_player_id: Uuid,
        card_index: usize,
    ) -> Result<Outcome, ActionError> {
        if self.pending_penalty.is_some() {
            return Err(ActionError::Unavailable);
        }
        let power = self.active_power.ok_or(ActionError::Unavailable)?;
        match power {
            Power::Peek => {
                if target_player_id != actor {
                    return Err(ActionError::InvalidTarget);
                }
                let idx = self.player_index(actor).ok_or(ActionError::InvalidTarget)?;
                let card = self.players[idx]
                    .hand
                    .get(card_index)
                    .map(|hc| hc.card)
                    .ok_or(ActionError::InvalidTarget)?;
                self.last_action = Some(LastActionInfo::now(LastAction::Peek {
                    player_id: actor,
                    card_index,
                }));
                let mut outcome = self.finish_turn();
                outcome.revealed = Some(card);
                Ok(outcome)
            }
            Power::Spy => {
                if target_player_id == actor {
                    return Err(ActionError::InvalidTarget);
                }
                let idx = self.player_index(target_player_id).ok_or(ActionError::InvalidTarget)?;
                let card = self.players[idx]
                    .hand
                    .get(card_index)
                    .map(|hc| hc.card)
                    .ok_or(ActionError::InvalidTarget)?;
                self.last_action = Some(LastActionInfo::now(LastAction::Spy {
                    spyer_id: actor,
                    target_id: target_player_id,
                    card_index,
                }));
                let mut outcome = self.finish_turn();
                outcome.revealed = Some(card);
                Ok(outcome)
            }
            Power::Swap => {
                let idx = self.player_index(target_player_id).ok_or(ActionError::InvalidTarget)?;
                if card_index >= self.players[idx].hand.len() {
                    return Err(ActionError::InvalidTarget);
                }
                match self.swap_selection {
                    None => {
                        self.swap_selection =
                            Some(SwapTarget { player_id: target_player_id, card_index });
                        Ok(Outcome::default())
                    }
                    Some(first) => {
                        let first_idx =
                            self.player_index(first.player_id).ok_or(ActionError::InvalidTarget)?;
                        if first.card_index >= self.players[first_idx].hand.len() {
                            // the first selection was invalidated (match splice)
                            self.swap_selection = None;
                            return Err(ActionError::InvalidTarget);
                        }
                        let a = self.players[first_idx].hand[first.card_index].card;
                        let b = self.players[idx].hand[card_index].card;
                        self.players[first_idx].hand[first.card_index].card = b;
                        self.players[idx].hand[card_index].card = a;
                        self.last_action = Some(LastActionInfo::now(LastAction::PowerSwap {
                            first_player_id: first.player_id,
                            first_index: first.card_index,
                            second_player_id: target_player_id,
                            second_index: card_index,
                        }));
                        self.swap_selection = None;
                        Ok(self.finish_turn())
                    }
                }
            }
        }
    }

    /// Escape hatch for an unresolved power: drops any pending swap
    /// selection and ends the turn.
    fn finish_power(&mut self) -> Result<Outcome, ActionError> {
        if self.active_power.is_none() {
            return Err(ActionError::Unavailable);
        }
        self.swap_selection = None;
        Ok(self.finish_turn())
    }

    fn finish_turn(&mut self) -> Outcome {
        let mut outcome = Outcome::default();
        outcome.round_ended = self.end_turn();
        outcome
    }

    /// Clears per-turn state and advances the turn pointer. Detects the
    /// zero-cards trigger and counts down an active final round.
    /// Returns true when the round ended.
    pub(crate) fn end_turn(&mut self) -> bool {
        self.clear_transients();
        let n = self.players.len();
        if n == 0 {
            return false;
        }
        let mut round_over = false;
        if let Some(fr) = self.final_round.as_mut() {
            fr.turns_remaining = fr.turns_remaining.saturating_sub(1);
            round_over = fr.turns_remaining == 0;
        }
        self.turn_index = (self.turn_index + 1) % n;
        if self.final_round.is_none() {
            if let Some(empty) = self.players.iter().find(|p| p.hand.is_empty()) {
                self.final_round = Some(FinalRound {
                    turns_remaining: n - 1,
                    triggered_by: empty.id,
                    reason: FinalRoundReason::ZeroCards,
                });
            }
        }
        if round_over {
            self.end_round();
        }
        round_over
    }

    /// Reveals hands, scores the round (call transform included), books
    /// history and totals, and enters the REVEALING_CARDS pause.
    pub fn end_round(&mut self) {
        // a card still held when the stock runs out goes to the discard
        if let Some(drawn) = self.drawn_card.take() {
            self.discard_pile.push(drawn.card);
        }
        self.clear_transients();

        for p in &mut self.players {
            p.raw_score = scoring::hand_value(&p.hand);
            p.final_score = p.raw_score;
            for hc in &mut p.hand {
                hc.face_up = true;
            }
        }
        if let Some(caller_idx) = self.kyro_caller.and_then(|id| self.player_index(id)) {
            let raws: Vec<i32> = self.players.iter().map(|p| p.raw_score).collect();
            let finals = scoring::call_adjusted(&raws, caller_idx);
            for (p, f) in self.players.iter_mut().zip(finals) {
                p.final_score = f;
            }
        }

        self.current_round += 1;
        let scores = self
            .players
            .iter()
            .map(|p| {
                (
                    p.id,
                    RoundScore {
                        raw: p.raw_score,
                        score: p.final_score,
                        doubled: p.final_score > p.raw_score && p.final_score != 0,
                    },
                )
            })
            .collect();
        self.round_history.push(RoundRecord { round: self.current_round, scores });

        for p in &mut self.players {
            p.total_score += p.final_score;
        }
        self.last_round_winner = self
            .players
            .iter()
            .min_by_key(|p| p.final_score)
            .map(|p| p.id);

        self.phase = Phase::Revealing;
        self.epoch += 1;
    }

    /// REVEALING_CARDS -> ROUND_OVER | GAME_OVER, fired by the reveal
    /// timer. The game ends once anyone's total reaches the threshold;
    /// the lowest total wins.
    pub fn finish_reveal(&mut self) {
        if self.phase != Phase::Revealing {
            return;
        }
        let busted = self.players.iter().any(|p| p.total_score >= config::WIN_THRESHOLD);
        if busted {
            self.phase = Phase::GameOver;
            self.game_winner = self
                .players
                .iter()
                .min_by_key(|p| p.total_score)
                .map(|p| p.id);
        } else {
            self.phase = Phase::RoundOver;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Card, Rank, Suit};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card(rank: Rank) -> Card {
        Card { id: Uuid::new_v4(), rank, suit: Some(Suit::Clubs) }
    }

    fn playing_room(n: usize) -> (Room, Vec<Uuid>) {
        let mut room = Room::new("ABCD".to_string());
        for i in 0..n {
            room.add_player(Uuid::new_v4(), format!("tok-{i}"), String::new(), String::new());
        }
        let ids: Vec<Uuid> = room.players.iter().map(|p| p.id).collect();
        let mut rng = StdRng::seed_from_u64(11);
        room.start_game(ids[0], &mut rng).unwrap();
        room.begin_playing(&mut rng);
        room.turn_index = 0;
        (room, ids)
    }

    #[test]
    fn start_game_requires_host_and_two_players() {
        let mut room = Room::new("ABCD".to_string());
        let a = room
            .add_player(Uuid::new_v4(), "a".into(), String::new(), String::new())
            .id;
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(room.start_game(a, &mut rng), Err(ActionError::NotEnoughPlayers));
        let b = room
            .add_player(Uuid::new_v4(), "b".into(), String::new(), String::new())
            .id;
        assert_eq!(room.start_game(b, &mut rng), Err(ActionError::NotHost));
        assert!(room.start_game(a, &mut rng).is_ok());
        assert_eq!(room.phase, Phase::Peeking);
    }

    #[test]
    fn actions_rejected_out_of_turn_without_mutation() {
        let (mut room, ids) = playing_room(2);
        let count = room.card_count();
        let err = room.apply(ids[1], Action::DrawStock).unwrap_err();
        assert_eq!(err, ActionError::NotYourTurn);
        assert_eq!(room.card_count(), count);
        assert!(room.drawn_card.is_none());
    }

    #[test]
    fn cannot_redraw_while_holding_a_card() {
        let (mut room, ids) = playing_room(2);
        room.apply(ids[0], Action::DrawStock).unwrap();
        assert!(room.drawn_card.is_some());
        assert_eq!(room.apply(ids[0], Action::DrawStock), Err(ActionError::Unavailable));
        assert_eq!(room.apply(ids[0], Action::DrawDiscard), Err(ActionError::Unavailable));
    }

    #[test]
    fn discard_draw_rejected_with_an_empty_hand() {
        let (mut room, ids) = playing_room(2);
        room.players[0].hand.clear();
        // nothing to swap the taken card into, so the draw is refused
        assert_eq!(room.apply(ids[0], Action::DrawDiscard), Err(ActionError::Unavailable));
        assert!(room.drawn_card.is_none());
        // the stock stays open, so the turn can still be completed
        room.apply(ids[0], Action::DrawStock).unwrap();
        room.apply(ids[0], Action::DiscardDrawn).unwrap();
    }

    #[test]
    fn discard_drawn_forbidden_for_discard_draws() {
        let (mut room, ids) = playing_room(2);
        room.apply(ids[0], Action::DrawDiscard).unwrap();
        assert_eq!(room.apply(ids[0], Action::DiscardDrawn), Err(ActionError::Unavailable));
    }

    #[test]
    fn swap_advances_turn_and_discards_old_card() {
        let (mut room, ids) = playing_room(2);
        room.apply(ids[0], Action::DrawStock).unwrap();
        let drawn = room.drawn_card.unwrap().card;
        let old = room.players[0].hand[0].card;
        room.apply(ids[0], Action::SwapCard { hand_index: 0 }).unwrap();
        assert_eq!(room.players[0].hand[0].card.id, drawn.id);
        assert_eq!(room.discard_pile.last().unwrap().id, old.id);
        assert_eq!(room.turn_index, 1);
        assert_eq!(room.card_count(), 54);
    }

    #[test]
    fn discarding_a_power_card_activates_the_power() {
        let (mut room, ids) = playing_room(2);
        // rig the stock so the draw is a queen
        room.deck.push(card(Rank::Queen));
        room.apply(ids[0], Action::DrawStock).unwrap();
        room.apply(ids[0], Action::DiscardDrawn).unwrap();
        assert_eq!(room.active_power, Some(Power::Spy));
        // turn has not advanced yet
        assert_eq!(room.turn_index, 0);
    }

    #[test]
    fn kyro_call_sets_countdown_and_keeps_turn() {
        let (mut room, ids) = playing_room(3);
        room.apply(ids[0], Action::CallKyro).unwrap();
        assert_eq!(room.kyro_caller, Some(ids[0]));
        let fr = room.final_round.unwrap();
        assert_eq!(fr.turns_remaining, 3);
        assert_eq!(fr.reason, FinalRoundReason::Kyro);
        assert_eq!(room.turn_index, 0);
        // no second call while a countdown is live
        assert_eq!(room.apply(ids[0], Action::CallKyro), Err(ActionError::Unavailable));
    }

    #[test]
    fn kyro_call_illegal_while_holding_a_card() {
        let (mut room, ids) = playing_room(2);
        room.apply(ids[0], Action::DrawStock).unwrap();
        assert_eq!(room.apply(ids[0], Action::CallKyro), Err(ActionError::Unavailable));
    }

    #[test]
    fn match_success_on_own_card_has_no_penalty() {
        let (mut room, ids) = playing_room(2);
        let top_rank = room.discard_pile.last().unwrap().rank;
        room.players[0].hand[1].card = card(top_rank);
        let outcome = room
            .apply(ids[0], Action::AttemptMatch { target_owner_id: ids[0], card_index: 1 })
            .unwrap();
        assert!(outcome.match_result.unwrap().success);
        assert!(room.pending_penalty.is_none());
        assert!(room.matched_this_turn);
        assert_eq!(room.players[0].hand.len(), 3);
        assert_eq!(room.card_count(), 54);
    }

    #[test]
    fn match_on_opponent_card_sets_penalty_on_matcher() {
        let (mut room, ids) = playing_room(2);
        let top_rank = room.discard_pile.last().unwrap().rank;
        room.players[1].hand[2].card = card(top_rank);
        room.apply(ids[0], Action::AttemptMatch { target_owner_id: ids[1], card_index: 2 })
            .unwrap();
        let penalty = room.pending_penalty.unwrap();
        assert_eq!(penalty.from, ids[0]);
        assert_eq!(penalty.to, ids[1]);
        assert_eq!(room.players[1].hand.len(), 3);
        // drawing is blocked until the owed card is handed over
        assert_eq!(room.apply(ids[0], Action::DrawStock), Err(ActionError::Unavailable));
    }

    #[test]
    fn give_card_clears_penalty_without_advancing_turn() {
        let (mut room, ids) = playing_room(2);
        let top_rank = room.discard_pile.last().unwrap().rank;
        room.players[1].hand[0].card = card(top_rank);
        room.apply(ids[0], Action::AttemptMatch { target_owner_id: ids[1], card_index: 0 })
            .unwrap();
        room.apply(ids[0], Action::GiveCard { hand_index: 0 }).unwrap();
        assert!(room.pending_penalty.is_none());
        assert_eq!(room.players[0].hand.len(), 3);
        assert_eq!(room.players[1].hand.len(), 4);
        assert_eq!(room.turn_index, 0);
        assert_eq!(room.card_count(), 54);
    }

    #[test]
    fn failed_match_draws_a_penalty_card() {
        let (mut room, ids) = playing_room(2);
        let top_rank = room.discard_pile.last().unwrap().rank;
        let wrong = if top_rank == Rank::Two { Rank::Three } else { Rank::Two };
        room.players[0].hand[0].card = card(wrong);
        let outcome = room
            .apply(ids[0], Action::AttemptMatch { target_owner_id: ids[0], card_index: 0 })
            .unwrap();
        assert!(!outcome.match_result.unwrap().success);
        assert_eq!(room.players[0].hand.len(), 5);
        assert!(!room.matched_this_turn);
        assert_eq!(room.card_count(), 54);
    }

    #[test]
    fn only_one_match_resolution_per_turn() {
        let (mut room, ids) = playing_room(2);
        let top_rank = room.discard_pile.last().unwrap().rank;
        room.players[0].hand[0].card = card(top_rank);
        room.players[0].hand[1].card = card(top_rank);
        room.apply(ids[0], Action::AttemptMatch { target_owner_id: ids[0], card_index: 0 })
            .unwrap();
        // second one matches the new top but the turn's match is spent
        assert_eq!(
            room.apply(ids[0], Action::AttemptMatch { target_owner_id: ids[0], card_index: 0 }),
            Err(ActionError::Unavailable)
        );
    }

    #[test]
    fn finish_power_requires_an_active_power() {
        let (mut room, ids) = playing_room(2);
        assert_eq!(room.apply(ids[0], Action::FinishPower), Err(ActionError::Unavailable));
        assert_eq!(room.turn_index, 0);
    }

    #[test]
    fn swap_power_is_two_step() {
        let (mut room, ids) = playing_room(2);
        room.deck.push(card(Rank::King));
        room.apply(ids[0], Action::DrawStock).unwrap();
        room.apply(ids[0], Action::DiscardDrawn).unwrap();
        assert_eq!(room.active_power, Some(Power::Swap));

        let mine = room.players[0].hand[0].card;
        let theirs = room.players[1].hand[3].card;
        room.apply(ids[0], Action::UsePower { target_player_id: ids[0], card_index: 0 })
            .unwrap();
        assert!(room.swap_selection.is_some());
        assert_eq!(room.turn_index, 0);
        room.apply(ids[0], Action::UsePower { target_player_id: ids[1], card_index: 3 })
            .unwrap();
        assert_eq!(room.players[0].hand[0].card.id, theirs.id);
        assert_eq!(room.players[1].hand[3].card.id, mine.id);
        assert!(room.swap_selection.is_none());
        assert_eq!(room.turn_index, 1);
    }

    #[test]
    fn spy_reveals_opponent_card_to_actor_only() {
        let (mut room, ids) = playing_room(2);
        room.deck.push(card(Rank::Queen));
        room.apply(ids[0], Action::DrawStock).unwrap();
        room.apply(ids[0], Action::DiscardDrawn).unwrap();
        let expected = room.players[1].hand[1].card;
        let outcome = room
            .apply(ids[0], Action::UsePower { target_player_id: ids[1], card_index: 1 })
            .unwrap();
        assert_eq!(outcome.revealed.unwrap().id, expected.id);
        assert_eq!(room.turn_index, 1);
    }

    #[test]
    fn drawing_the_last_stock_card_ends_the_round() {
        let (mut room, ids) = playing_room(2);
        room.deck.truncate(1);
        let outcome = room.apply(ids[0], Action::DrawStock).unwrap();
        assert!(outcome.round_ended);
        assert_eq!(room.phase, Phase::Revealing);
        for p in &room.players {
            assert!(p.hand.iter().all(|hc| hc.face_up));
        }
    }

    #[test]
    fn zero_cards_triggers_final_round_for_others_only() {
        let (mut room, ids) = playing_room(3);
        room.players[1].hand.clear();
        assert!(!room.end_turn());
        let fr = room.final_round.unwrap();
        assert_eq!(fr.reason, FinalRoundReason::ZeroCards);
        assert_eq!(fr.triggered_by, ids[1]);
        assert_eq!(fr.turns_remaining, 2);
        // two more completed turns and the round is over
        assert!(!room.end_turn());
        assert!(room.end_turn());
        assert_eq!(room.phase, Phase::Revealing);
    }

    /// Empties hands so `end_round` adds nothing to running totals.
    fn zero_hands(room: &mut Room) {
        for p in &mut room.players {
            p.hand.clear();
        }
    }

    #[test]
    fn finish_reveal_routes_to_round_over_or_game_over() {
        let (mut room, _ids) = playing_room(2);
        zero_hands(&mut room);
        room.end_round();
        room.finish_reveal();
        assert_eq!(room.phase, Phase::RoundOver);

        let (mut room, _ids) = playing_room(2);
        zero_hands(&mut room);
        room.players[0].total_score = config::WIN_THRESHOLD;
        room.players[1].total_score = 12;
        let winner = room.players[1].id;
        room.end_round();
        room.finish_reveal();
        assert_eq!(room.phase, Phase::GameOver);
        assert_eq!(room.game_winner, Some(winner));
    }

    #[test]
    fn ready_redeals_once_all_connected_players_opt_in() {
        let (mut room, ids) = playing_room(2);
        zero_hands(&mut room);
        room.end_round();
        room.finish_reveal();
        let mut rng = StdRng::seed_from_u64(9);
        assert!(!room.ready(ids[0], &mut rng).unwrap());
        assert!(room.ready(ids[1], &mut rng).unwrap());
        assert_eq!(room.phase, Phase::Peeking);
        assert_eq!(room.card_count(), 54);
    }

    #[test]
    fn game_over_ready_resets_totals_and_history() {
        let (mut room, ids) = playing_room(2);
        zero_hands(&mut room);
        room.players[0].total_score = config::WIN_THRESHOLD;
        room.end_round();
        room.finish_reveal();
        assert_eq!(room.phase, Phase::GameOver);
        let mut rng = StdRng::seed_from_u64(10);
        room.ready(ids[0], &mut rng).unwrap();
        room.ready(ids[1], &mut rng).unwrap();
        assert_eq!(room.phase, Phase::Peeking);
        assert!(room.players.iter().all(|p| p.total_score == 0));
        assert!(room.round_history.is_empty());
        assert_eq!(room.current_round, 0);
    }

    #[test]
    fn peek_limited_to_two_per_player() {
        let mut room = Room::new("ABCD".to_string());
        let a = room
            .add_player(Uuid::new_v4(), "a".into(), String::new(), String::new())
            .id;
        room.add_player(Uuid::new_v4(), "b".into(), String::new(), String::new());
        let mut rng = StdRng::seed_from_u64(12);
        room.start_game(a, &mut rng).unwrap();
        assert!(room.peek(a, 0).is_ok());
        assert!(room.peek(a, 1).is_ok());
        assert_eq!(room.peek(a, 2), Err(ActionError::Unavailable));
        assert_eq!(room.peek(a, 9), Err(ActionError::Unavailable));
    }
}
