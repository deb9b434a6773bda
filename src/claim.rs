use std::fmt::{Debug, Formatter};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Receiver;
use crate::Card::{Ambassador, Assassin, Captain, Contessa};
use crate::notifier::{Notifier, SubscriptionId};
use crate::{Action, ActionKind, Card, GameError, Player, Result};

/// Whether `counter` may be claimed to block an action of `character`.
///
/// A contessa blocks an assassin; a captain or an ambassador blocks a captain.
/// Nothing else can be counter-claimed.
pub fn is_valid_counter_claim(character: Card, counter: Card) -> bool {
    match character {
        Assassin => counter == Contessa,
        Captain => counter == Ambassador || counter == Captain,
        _ => false,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Open,
    Passed,
    Challenged,
    // the claimant revealed a card, `matched` if it was the claimed one
    Proven { matched: bool },
}

impl ClaimStatus {
    pub fn is_finished(self) -> bool {
        self != ClaimStatus::Open
    }

    /// Open and challenged claims block every new action.
    pub fn is_frozen(self) -> bool {
        matches!(self, ClaimStatus::Open | ClaimStatus::Challenged)
    }
}

/// "I hold this character." A claim may be a lie; it only gets checked when
/// someone challenges it.
///
/// Passing and challenging are first-writer-wins: once either happened the
/// other is ignored. A challenged claim is settled by `prove`. Every change is
/// announced to the claim's subscribers.
pub struct Claim {
    author: usize,
    character: Card,
    succeed: Option<bool>,
    challenge: Option<bool>,
    notifier: Notifier<ClaimStatus>,
}

impl Claim {
    /// Fails for a dead author or a non-character card. Whether the author
    /// actually holds the card is not checked.
    pub fn new(author: usize, player: &Player, character: Card) -> Result<Self> {
        if player.is_dead() {
            return Err(GameError::InvalidPlayer);
        }

        if !character.is_character() {
            return Err(GameError::InvalidCharacter);
        }

        Ok(Self {
            author,
            character,
            succeed: None,
            challenge: None,
            notifier: Notifier::new(ClaimStatus::Open),
        })
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.notifier = Notifier::with_capacity(self.status(), capacity);
        self
    }

    pub fn author(&self) -> usize {
        self.author
    }

    pub fn character(&self) -> Card {
        self.character
    }

    pub fn is_finished(&self) -> bool {
        self.succeed.is_some() || self.challenge.is_some()
    }

    /// Copies of (passed or proven, challenged).
    pub fn results(&self) -> (Option<bool>, Option<bool>) {
        (self.succeed, self.challenge)
    }

    pub fn status(&self) -> ClaimStatus {
        match (self.succeed, self.challenge) {
            (None, None) => ClaimStatus::Open,
            (Some(_), None) => ClaimStatus::Passed,
            (None, Some(_)) => ClaimStatus::Challenged,
            (Some(matched), Some(_)) => ClaimStatus::Proven { matched },
        }
    }

    pub fn pass(&mut self) {
        if self.is_finished() {
            return;
        }
        self.succeed = Some(true);
        self.announce();
    }

    pub fn challenge(&mut self) {
        if self.is_finished() {
            return;
        }
        self.challenge = Some(true);
        self.announce();
    }

    /// Settles a challenged claim with whether the revealed card matched.
    pub fn prove(&mut self, matched: bool) -> Result<()> {
        if self.challenge.is_none() {
            return Err(GameError::ClaimNotChallenged);
        }
        if self.succeed.is_some() {
            return Err(GameError::ClaimProven);
        }

        self.succeed = Some(matched);
        self.announce();
        Ok(())
    }

    /// The history entry describing where this claim currently stands.
    pub fn action(&self) -> Action {
        let kind = match (self.succeed, self.challenge) {
            (Some(_), Some(_)) => ActionKind::ClaimProof,
            (None, Some(_)) => ActionKind::ClaimChallenge,
            (Some(_), None) => ActionKind::ClaimPassed,
            (None, None) => ActionKind::Claim,
        };

        Action {
            character: self.character,
            ..Action::new(self.author, kind)
        }
    }

    /// Subscribe before the claim can change to be sure to see the change.
    pub fn subscribe(&self) -> (SubscriptionId, Receiver<ClaimStatus>) {
        self.notifier.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn announce(&self) {
        self.notifier.set(self.status());
        self.notifier.announce();
    }
}

impl Debug for Claim {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claim")
            .field("author", &self.author)
            .field("character", &self.character)
            .field("status", &self.status())
            .finish()
    }
}
