//! Scoring engine: hand totals and the Kyro-call risk/reward transform.

use crate::game::state::HandCard;

/// Raw point total of a hand.
pub fn hand_value(hand: &[HandCard]) -> i32 {
    hand.iter().map(|hc| hc.card.rank.points()).sum()
}

/// End-of-round transform for the Kyro caller.
///
/// Contract: the caller wins ties. If the caller's raw value equals the
/// minimum raw value among all players their final score is 0; otherwise
/// it doubles. Non-callers keep their raw value.
pub fn call_adjusted(raw_scores: &[i32], caller_idx: usize) -> Vec<i32> {
    let min = raw_scores.iter().copied().min().unwrap_or(0);
    raw_scores
        .iter()
        .enumerate()
        .map(|(i, &raw)| {
            if i != caller_idx {
                raw
            } else if raw == min {
                0
            } else {
                raw * 2
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Card, Rank, Suit};
    use uuid::Uuid;

    fn hand_of(ranks: &[Rank]) -> Vec<HandCard> {
        ranks
            .iter()
            .map(|&rank| HandCard {
                card: Card { id: Uuid::new_v4(), rank, suit: Some(Suit::Spades) },
                face_up: false,
            })
            .collect()
    }

    #[test]
    fn hand_value_sums_points() {
        let hand = hand_of(&[Rank::Ace, Rank::Five, Rank::King, Rank::Joker]);
        assert_eq!(hand_value(&hand), -1 + 5 + 13 + 0);
    }

    #[test]
    fn empty_hand_is_zero() {
        assert_eq!(hand_value(&[]), 0);
    }

    #[test]
    fn caller_with_minimum_scores_zero() {
        assert_eq!(call_adjusted(&[3, 7], 0), vec![0, 7]);
    }

    #[test]
    fn caller_without_minimum_doubles() {
        assert_eq!(call_adjusted(&[3, 7], 1), vec![3, 14]);
    }

    #[test]
    fn caller_wins_ties() {
        assert_eq!(call_adjusted(&[5, 5, 9], 1), vec![5, 0, 9]);
    }

    #[test]
    fn negative_raw_value_doubles_when_not_minimum() {
        // A hand full of aces can go negative; doubling still applies.
        assert_eq!(call_adjusted(&[-4, -2], 1), vec![-4, -4]);
    }
}
