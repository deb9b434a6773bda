use serde::{Deserialize, Serialize};
use crate::Hand;

/// A seated player: an external identity, a coin balance and a hand.
///
/// Once the hand is seen empty the player is dead for good, even if cards
/// are handed back later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    id: String,
    pub coins: u8,
    hand: Hand,
    dead: bool,
}

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            coins: 0,
            hand: Hand::default(),
            dead: false,
        }
    }

    pub fn with_hand(id: impl Into<String>, coins: u8, hand: Hand) -> Self {
        let mut player = Player::new(id);
        player.coins = coins;
        player.hand = hand;
        player
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    pub fn set_hand(&mut self, hand: Hand) {
        if hand.is_empty() {
            self.dead = true;
        }
        self.hand = hand;
    }

    pub fn is_dead(&self) -> bool {
        self.dead || self.hand.is_empty()
    }

    pub(crate) fn eliminated(&self) -> bool {
        self.dead
    }

    // the opening deal fills an empty hand without tripping the death latch
    pub(crate) fn deal(&mut self, hand: Hand) {
        self.hand = hand;
    }
}

#[cfg(test)]
mod tests {
    use crate::Card::{Assassin, Duke, Empty};
    use crate::{Hand, Player};

    #[test]
    fn dead_with_empty_hand() {
        let player = Player::new("p0");
        assert!(player.is_dead());

        let player = Player::with_hand("p0", 2, Hand::new(Assassin, Empty));
        assert!(!player.is_dead());
    }

    #[test]
    fn death_is_latched() {
        let mut player = Player::with_hand("p0", 2, Hand::new(Duke, Empty));
        player.set_hand(Hand::default());
        assert!(player.is_dead());

        player.set_hand(Hand::new(Duke, Duke));
        assert!(player.is_dead());
    }

    #[test]
    fn deal_revives_an_unlatched_seat() {
        let mut player = Player::new("p0");
        assert!(player.is_dead());

        player.deal(Hand::new(Duke, Assassin));
        assert!(!player.is_dead());
    }
}
