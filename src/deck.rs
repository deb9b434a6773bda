use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use crate::{Card, GameError, Result, CHARACTER_VARIANTS};

/// Copies of each character in a fresh deck.
pub const COPIES_PER_CHARACTER: usize = 3;

/// The court deck and the random source used to shuffle it.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
    rng: Pcg64,
}

impl Deck {
    /// A fresh, unshuffled 15 card deck.
    pub fn standard(rng: Pcg64) -> Self {
        let cards = CHARACTER_VARIANTS.iter()
            .flat_map(|&card| std::iter::repeat(card).take(COPIES_PER_CHARACTER))
            .collect();

        Self { cards, rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Deck::standard(Pcg64::seed_from_u64(seed))
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut self.rng);
    }

    /// Removes and returns the top `n` cards.
    pub fn draw(&mut self, n: usize) -> Result<Vec<Card>> {
        if n > self.cards.len() {
            return Err(GameError::DeckExhausted {
                requested: n,
                available: self.cards.len(),
            });
        }

        Ok(self.cards.drain(..n).collect())
    }

    /// Puts cards back at the bottom of the deck. Empty slots are skipped.
    pub fn put_back(&mut self, cards: impl IntoIterator<Item = Card>) {
        self.cards.extend(cards.into_iter().filter(|card| card.is_character()));
    }

    /// Returns `card` to the deck, shuffles, and draws its replacement.
    pub fn exchange(&mut self, card: Card) -> Result<Card> {
        self.put_back([card]);
        self.shuffle();
        let mut drawn = self.draw(1)?;
        drawn.pop().ok_or(GameError::DeckExhausted { requested: 1, available: 0 })
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}
