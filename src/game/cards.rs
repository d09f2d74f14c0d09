//! Deck engine: card values, deck construction, shuffling.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Joker,
}

/// One-shot ability granted by discarding a drawn power card.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Power {
    /// Look at one of your own cards.
    Peek,
    /// Look at one opponent card.
    Spy,
    /// Swap any two hand cards (own or opponents').
    Swap,
}

impl Rank {
    /// Canonical point table. Aces are worth -1, Jokers 0, face cards
    /// their sequence value. This is the single source of truth for
    /// scoring.
    pub fn points(self) -> i32 {
        match self {
            Rank::Ace => -1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten => 10,
            Rank::Jack => 11,
            Rank::Queen => 12,
            Rank::King => 13,
            Rank::Joker => 0,
        }
    }

    pub fn power(self) -> Option<Power> {
        match self {
            Rank::Jack => Some(Power::Peek),
            Rank::Queen => Some(Power::Spy),
            Rank::King | Rank::Joker => Some(Power::Swap),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub id: Uuid,
    pub rank: Rank,
    /// Jokers carry no suit.
    pub suit: Option<Suit>,
}

impl Card {
    fn new(rank: Rank, suit: Option<Suit>) -> Self {
        Card { id: Uuid::new_v4(), rank, suit }
    }

    pub fn power(&self) -> Option<Power> {
        self.rank.power()
    }
}

const SUITS: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
const RANKS: [Rank; 13] = [
    Rank::Ace,
    Rank::Two,
    Rank::Three,
    Rank::Four,
    Rank::Five,
    Rank::Six,
    Rank::Seven,
    Rank::Eight,
    Rank::Nine,
    Rank::Ten,
    Rank::Jack,
    Rank::Queen,
    Rank::King,
];

/// 52 suited cards plus two jokers, each with a fresh id.
pub fn build_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(54);
    for s in SUITS {
        for r in RANKS {
            deck.push(Card::new(r, Some(s)));
        }
    }
    deck.push(Card::new(Rank::Joker, None));
    deck.push(Card::new(Rank::Joker, None));
    deck
}

/// Fresh, uniformly shuffled 54-card deck. Pop from the end to draw.
pub fn shuffled_deck<R: Rng>(rng: &mut R) -> Vec<Card> {
    let mut deck = build_deck();
    deck.shuffle(rng);
    deck
}
