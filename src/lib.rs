pub mod action;
pub mod challenge;
pub mod claim;
pub mod config;
pub mod deck;
pub mod error;
pub mod game;
pub mod notifier;
pub mod player;

pub use action::{Action, ActionKind};
pub use challenge::{ChallengeChain, ChallengeId, ChallengeKind};
pub use claim::{Claim, ClaimStatus};
pub use config::GameConfig;
pub use deck::Deck;
pub use error::{GameError, Result};
pub use game::{Game, MAX_SEATS};
pub use notifier::{Notifier, SubscriptionId};
pub use player::Player;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use crate::Card::{Ambassador, Assassin, Captain, Contessa, Duke, Empty};

/// A character card. `Empty` marks a slot whose card has been lost.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Card {
    #[default]
    Empty = 0,
    // kills an opponent's card for 3 coins, countered by Contessa
    Assassin = 1,
    // takes 3 coins, blocks financial aid
    Duke = 2,
    // exchanges cards with the deck, blocks stealing
    Ambassador = 3,
    // steals 2 coins, blocks stealing
    Captain = 4,
    // blocks assassination
    Contessa = 5,
}

pub static CHARACTER_VARIANTS: [Card; 5] = [
    Assassin,
    Duke,
    Ambassador,
    Captain,
    Contessa,
];

/// Returns true if `v` is the code of one of the five characters.
pub fn is_valid_card(v: u8) -> bool {
    v >= Assassin as u8 && v <= Contessa as u8
}

impl Card {
    pub fn is_character(self) -> bool {
        self != Empty
    }
}

impl From<Card> for u8 {
    fn from(card: Card) -> Self {
        card as u8
    }
}

impl TryFrom<u8> for Card {
    type Error = GameError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Empty),
            1 => Ok(Assassin),
            2 => Ok(Duke),
            3 => Ok(Ambassador),
            4 => Ok(Captain),
            5 => Ok(Contessa),
            _ => Err(GameError::InvalidCharacter),
        }
    }
}

/// Two card slots. Hands are values: every helper returns a new hand.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hand(pub [Card; 2]);

impl Hand {
    pub fn new(first: Card, second: Card) -> Self {
        Hand([first, second])
    }

    pub fn cards(&self) -> [Card; 2] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == Empty && self.0[1] == Empty
    }

    pub fn contains(&self, card: Card) -> bool {
        card.is_character() && self.0.contains(&card)
    }

    pub fn position(&self, card: Card) -> Option<usize> {
        self.0.iter().position(|&c| c == card)
    }

    /// Empties the slot at `place`. If that slot is already empty the other
    /// slot is emptied instead, so a removal always costs exactly one card.
    /// Places above 1 leave the hand unchanged.
    pub fn remove(self, place: usize) -> Hand {
        let mut hand = self;
        if place > 1 {
            return hand;
        }

        if hand.0[place] == Empty {
            hand.0[1 - place] = Empty;
        } else {
            hand.0[place] = Empty;
        }
        hand
    }

    /// Puts `card` in slot `place`. Places above 1 leave the hand unchanged.
    pub fn replace(self, place: usize, card: Card) -> Hand {
        let mut hand = self;
        if let Some(slot) = hand.0.get_mut(place) {
            *slot = card;
        }
        hand
    }
}

impl Display for Hand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.0[0] as u8, self.0[1] as u8)
    }
}

impl FromStr for Hand {
    type Err = GameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (first, second) = s
            .split_once(':')
            .ok_or_else(|| GameError::HandFormat(s.to_string()))?;

        let parse = |part: &str| -> std::result::Result<Card, GameError> {
            let code = part
                .parse::<u8>()
                .map_err(|_| GameError::HandFormat(s.to_string()))?;
            Card::try_from(code).map_err(|_| GameError::HandFormat(s.to_string()))
        };

        Ok(Hand([parse(first)?, parse(second)?]))
    }
}

// poisoned locks are recovered, guarded state is never left half-written
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
