use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use crate::Card::{Ambassador, Assassin, Captain, Contessa, Duke, Empty};
use crate::claim::is_valid_counter_claim;
use crate::{Card, GameError, Hand, Player, Result};

pub const MAX_COINS: u8 = 10;
pub const COUP_COST: u8 = 7;
pub const ASSASSIN_COST: u8 = 3;
// at this many coins a player's only legal move is a coup
pub const FORCED_COUP_COINS: u8 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Income,
    FinancialAid,
    Coup,
    Character,
    // audit entries of the claim protocol
    Claim,
    ClaimPassed,
    ClaimChallenge,
    ClaimProof,
    ClaimPunishment,
    // two cards dealt to a seat when the game is created
    Deal,
}

impl ActionKind {
    /// Kinds a caller may stage. Everything else only appears in history.
    pub fn is_playable(self) -> bool {
        matches!(
            self,
            ActionKind::Income
                | ActionKind::FinancialAid
                | ActionKind::Coup
                | ActionKind::Character
                | ActionKind::ClaimPunishment
        )
    }
}

fn coins_plus(coins: u8, amount: u8) -> u8 {
    if coins >= MAX_COINS {
        return coins;
    }

    coins.saturating_add(amount).min(MAX_COINS)
}

pub fn income(coins: u8) -> u8 {
    coins_plus(coins, 1)
}

pub fn financial_aid(coins: u8) -> u8 {
    coins_plus(coins, 2)
}

pub fn duke(coins: u8) -> u8 {
    coins_plus(coins, 3)
}

fn minus_coins_remove_from_hand(cost: u8, coins: u8, place: u8, hand: Hand) -> (u8, Hand) {
    if coins < cost || place > 1 || hand.is_empty() {
        return (coins, hand);
    }

    (coins - cost, hand.remove(place as usize))
}

pub fn coup(coins: u8, place: u8, hand: Hand) -> (u8, Hand) {
    minus_coins_remove_from_hand(COUP_COST, coins, place, hand)
}

pub fn assassin(coins: u8, place: u8, hand: Hand) -> (u8, Hand) {
    minus_coins_remove_from_hand(ASSASSIN_COST, coins, place, hand)
}

pub fn claim_punishment(place: u8, hand: Hand) -> Hand {
    minus_coins_remove_from_hand(0, 0, place, hand).1
}

/// The captain takes up to two coins, never more than the other player has.
pub fn captain(captain_coins: u8, other_coins: u8) -> (u8, u8) {
    let taken = other_coins.min(2);
    (captain_coins.saturating_add(taken), other_coins - taken)
}

/// Swaps hand slot `i` with drawn slot `places[i]` for every place below 2.
/// Returns the new hand and the new drawn cards.
pub fn ambassador(places: [u8; 2], hand: Hand, drawn: Hand) -> (Hand, Hand) {
    let mut new_hand = hand;
    let mut new_drawn = drawn;

    // both slots taking the same drawn card would duplicate it
    if places[0] == places[1] && places[0] <= 1 {
        return (new_hand, new_drawn);
    }

    for (slot, &place) in places.iter().enumerate() {
        if place < 2 {
            new_hand.0[slot] = drawn.0[place as usize];
            new_drawn.0[place as usize] = hand.0[slot];
        }
    }

    (new_hand, new_drawn)
}

/// A single move. Seats are indices into the game's player slots.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub author: usize,
    pub against: Option<usize>,
    pub kind: ActionKind,
    pub character: Card,
    // card slot of the target hit by a coup, assassination or punishment
    pub place: Option<u8>,
    pub ambassador_places: [u8; 2],
    pub ambassador_hand: Hand,
}

impl Action {
    pub fn new(author: usize, kind: ActionKind) -> Self {
        Self {
            author,
            against: None,
            kind,
            character: Empty,
            place: None,
            ambassador_places: [2, 2],
            ambassador_hand: Hand::default(),
        }
    }

    pub fn income(author: usize) -> Self {
        Action::new(author, ActionKind::Income)
    }

    pub fn financial_aid(author: usize) -> Self {
        Action::new(author, ActionKind::FinancialAid)
    }

    pub fn coup(author: usize, against: usize, place: u8) -> Self {
        Self {
            against: Some(against),
            place: Some(place),
            ..Action::new(author, ActionKind::Coup)
        }
    }

    pub fn character(author: usize, character: Card) -> Self {
        Self {
            character,
            ..Action::new(author, ActionKind::Character)
        }
    }

    pub fn tax(author: usize) -> Self {
        Action::character(author, Duke)
    }

    pub fn assassinate(author: usize, against: usize, place: u8) -> Self {
        Self {
            against: Some(against),
            place: Some(place),
            ..Action::character(author, Assassin)
        }
    }

    pub fn steal(author: usize, against: usize) -> Self {
        Self {
            against: Some(against),
            ..Action::character(author, Captain)
        }
    }

    pub fn exchange(author: usize, places: [u8; 2], drawn: Hand) -> Self {
        Self {
            ambassador_places: places,
            ambassador_hand: drawn,
            ..Action::character(author, Ambassador)
        }
    }

    /// A character action used to block `against`'s staged action.
    pub fn block(author: usize, against: usize, character: Card) -> Self {
        Self {
            against: Some(against),
            ..Action::character(author, character)
        }
    }

    pub fn punish(author: usize, against: usize, place: u8) -> Self {
        Self {
            against: Some(against),
            place: Some(place),
            ..Action::new(author, ActionKind::ClaimPunishment)
        }
    }

    pub(crate) fn deal(seat: usize, hand: Hand) -> Self {
        Self {
            ambassador_hand: hand,
            ..Action::new(seat, ActionKind::Deal)
        }
    }

    /// Coins the author must hold for this action to be legal.
    pub fn cost(&self) -> u8 {
        match (self.kind, self.character) {
            (ActionKind::Coup, _) => COUP_COST,
            (ActionKind::Character, Assassin) => ASSASSIN_COST,
            _ => 0,
        }
    }

    /// An ambassador action with no target swaps cards with the deck. With a
    /// target it only blocks a steal.
    pub fn is_exchange(&self) -> bool {
        self.kind == ActionKind::Character && self.character == Ambassador && self.against.is_none()
    }

    // contessas and targeted ambassadors can only answer another action
    pub(crate) fn is_block_only(&self) -> bool {
        self.kind == ActionKind::Character
            && (self.character == Contessa || (self.character == Ambassador && self.against.is_some()))
    }

    fn requires_target(&self) -> bool {
        match self.kind {
            ActionKind::Coup | ActionKind::ClaimPunishment => true,
            ActionKind::Character => matches!(self.character, Assassin | Captain),
            _ => false,
        }
    }

    fn requires_place(&self) -> bool {
        match self.kind {
            ActionKind::Coup | ActionKind::ClaimPunishment => true,
            ActionKind::Character => self.character == Assassin,
            _ => false,
        }
    }

    /// Checks the action's shape against the seated players: live author and
    /// target, valid place, kind and character, enough coins.
    pub fn validate(&self, players: &[Option<Player>]) -> Result<()> {
        let author = live_seat(players, self.author).ok_or(GameError::InvalidPlayer)?;

        if let Some(against) = self.against {
            if against == self.author {
                return Err(GameError::SamePlayer);
            }
            live_seat(players, against).ok_or(GameError::InvalidPlayer)?;
        } else if self.requires_target() {
            return Err(GameError::InvalidPlayer);
        }

        match self.place {
            Some(place) if place > 1 => return Err(GameError::InvalidPlace),
            None if self.requires_place() => return Err(GameError::InvalidPlace),
            _ => {}
        }

        if !self.kind.is_playable() {
            return Err(GameError::InvalidActionKind);
        }

        if self.kind == ActionKind::Character {
            if !self.character.is_character() {
                return Err(GameError::InvalidCharacter);
            }

            if self.is_exchange() && !self.ambassador_hand.cards().iter().all(|c| c.is_character()) {
                return Err(GameError::InvalidCharacter);
            }
        }

        let need = self.cost();
        if author.coins < need {
            return Err(GameError::InsufficientCoins { need, have: author.coins });
        }

        Ok(())
    }

    /// Applies the action's effect to the seated players. The action must have
    /// been validated. For an exchange the returned cards are written back into
    /// `ambassador_hand`.
    pub(crate) fn execute(&mut self, players: &mut [Option<Player>]) {
        let Some(author) = seat(players, self.author).map(|p| (p.coins, p.hand())) else {
            return;
        };
        let target = self.against.and_then(|t| seat(players, t).map(|p| (p.coins, p.hand())));
        let place = self.place.unwrap_or(2);

        match (self.kind, self.character) {
            (ActionKind::Income, _) => {
                self.set_author_coins(players, income(author.0));
            }
            (ActionKind::FinancialAid, _) => {
                self.set_author_coins(players, financial_aid(author.0));
            }
            (ActionKind::Coup, _) => {
                if let Some((_, hand)) = target {
                    let (coins, hand) = coup(author.0, place, hand);
                    self.set_author_coins(players, coins);
                    self.set_target_hand(players, hand);
                }
            }
            (ActionKind::Character, Assassin) => {
                if let Some((_, hand)) = target {
                    let (coins, hand) = assassin(author.0, place, hand);
                    self.set_author_coins(players, coins);
                    self.set_target_hand(players, hand);
                }
            }
            (ActionKind::Character, Duke) => {
                self.set_author_coins(players, duke(author.0));
            }
            (ActionKind::Character, Captain) => {
                if let (Some((other, _)), Some(against)) = (target, self.against) {
                    let (coins, other) = captain(author.0, other);
                    self.set_author_coins(players, coins);
                    if let Some(player) = seat(players, against) {
                        player.coins = other;
                    }
                }
            }
            (ActionKind::Character, Ambassador) if self.against.is_none() => {
                let (hand, drawn) = ambassador(self.ambassador_places, author.1, self.ambassador_hand);
                if let Some(player) = seat(players, self.author) {
                    player.set_hand(hand);
                }
                self.ambassador_hand = drawn;
            }
            (ActionKind::ClaimPunishment, _) => {
                if let Some((_, hand)) = target {
                    self.set_target_hand(players, claim_punishment(place, hand));
                }
            }
            // contessa has no action of her own, claim entries have no effect
            _ => {}
        }
    }

    fn set_author_coins(&self, players: &mut [Option<Player>], coins: u8) {
        if let Some(player) = seat(players, self.author) {
            player.coins = coins;
        }
    }

    fn set_target_hand(&self, players: &mut [Option<Player>], hand: Hand) {
        if let Some(player) = self.against.and_then(|t| seat(players, t)) {
            player.set_hand(hand);
        }
    }
}

fn seat(players: &mut [Option<Player>], idx: usize) -> Option<&mut Player> {
    players.get_mut(idx).and_then(Option::as_mut)
}

fn live_seat(players: &[Option<Player>], idx: usize) -> Option<&Player> {
    players
        .get(idx)
        .and_then(Option::as_ref)
        .filter(|player| !player.is_dead())
}

/// Whether `counter` may be staged against the already staged `primary`.
///
/// Financial aid is blocked by a duke; a character action is blocked by any
/// character allowed to counter-claim it.
pub fn is_valid_counter_action(primary: &Action, counter: &Action) -> bool {
    match (primary.kind, counter.kind) {
        (ActionKind::FinancialAid, ActionKind::Character) => counter.character == Duke,
        (ActionKind::Character, ActionKind::Character) => {
            is_valid_counter_claim(primary.character, counter.character)
        }
        _ => false,
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let author = self.author;
        let against = self.against.map_or("nobody".to_string(), |t| format!("player {t}"));

        match self.kind {
            ActionKind::Income => {
                f.write_fmt(format_args!("Player {author} takes Income"))
            }
            ActionKind::FinancialAid => {
                f.write_fmt(format_args!("Player {author} gets financial aid"))
            }
            ActionKind::Coup => {
                f.write_fmt(format_args!("Player {author} coups {against}"))
            }
            ActionKind::Character => match self.character {
                Assassin => f.write_fmt(format_args!("Player {author} assassinates {against}")),
                Duke => f.write_fmt(format_args!("Player {author} acts as Duke")),
                Captain => f.write_fmt(format_args!("Player {author} steals from {against}")),
                Ambassador if self.against.is_some() => {
                    f.write_fmt(format_args!("Player {author} blocks {against} with Ambassador"))
                }
                Ambassador => f.write_fmt(format_args!("Player {author} exchanges cards")),
                Contessa => f.write_fmt(format_args!("Player {author} blocks with Contessa")),
                Empty => f.write_fmt(format_args!("Player {author} acts as nobody")),
            },
            ActionKind::Claim => {
                f.write_fmt(format_args!("Player {author} claims {:?}", self.character))
            }
            ActionKind::ClaimPassed => {
                f.write_fmt(format_args!("Player {author}'s {:?} claim passes", self.character))
            }
            ActionKind::ClaimChallenge => {
                f.write_fmt(format_args!("Player {author} challenges {against}'s {:?} claim", self.character))
            }
            ActionKind::ClaimProof => {
                f.write_fmt(format_args!("Player {author} reveals {:?} to {against}", self.character))
            }
            ActionKind::ClaimPunishment => {
                f.write_fmt(format_args!("Player {author} punishes {against}"))
            }
            ActionKind::Deal => {
                f.write_fmt(format_args!("Player {author} is dealt {}", self.ambassador_hand))
            }
        }
    }
}
