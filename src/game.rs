//! The game orchestrator.
//!
//! A `Game` is shared between callers (usually behind an `Arc`) and guards
//! each piece of state with its own lock. Locks are always taken in the order
//! claim, forfeit, actions, players, history, deck, drawn, and never held
//! across an await.

use rand::SeedableRng;
use rand_pcg::Pcg64;
use tokio::sync::mpsc::Receiver;
use std::sync::Mutex;
use crate::action::{is_valid_counter_action, FORCED_COUP_COINS};
use crate::{
    lock, Action, ActionKind, Card, ChallengeChain, ChallengeId, ChallengeKind, Claim, ClaimStatus,
    Deck, GameConfig, GameError, Hand, Notifier, Player, Result, SubscriptionId,
};

pub const MAX_SEATS: usize = 5;
const MIN_SEATS: usize = 2;

pub struct Game {
    claim: Mutex<Option<Claim>>,
    // (claimant, character) of a claim disproven this turn
    forfeit: Mutex<Option<(usize, Card)>>,
    // primary action, then its counter or a punishment
    actions: Mutex<[Option<Action>; 2]>,
    players: Mutex<[Option<Player>; MAX_SEATS]>,
    history: Mutex<Vec<Action>>,
    deck: Mutex<Deck>,
    // cards out of the deck waiting for an exchange
    drawn: Mutex<Vec<Card>>,
    turn: Notifier<usize>,
    challenges: ChallengeChain,
    max: usize,
    config: GameConfig,
}

impl Game {
    /// Seats a game. Deck shuffles are seeded from `config.seed` when present.
    pub fn new(seats: [Option<Player>; MAX_SEATS], config: GameConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };

        Game::with_rng(seats, config, rng)
    }

    /// Occupied seats must be contiguous from seat 0. Every seated player gets
    /// two cards from the shuffled deck and the configured starting coins.
    pub fn with_rng(
        mut seats: [Option<Player>; MAX_SEATS],
        config: GameConfig,
        rng: Pcg64,
    ) -> Result<Self> {
        config.validate()?;

        let max = seats.iter().flatten().count();
        if !(MIN_SEATS..=MAX_SEATS).contains(&max) {
            tracing::debug!(seats = max, "rejected player amount");
            return Err(GameError::InvalidPlayerAmount);
        }

        if seats[..max].iter().any(Option::is_none) || seats.iter().flatten().any(Player::eliminated) {
            tracing::debug!("rejected seating");
            return Err(GameError::InvalidPlayer);
        }

        let mut deck = Deck::standard(rng);
        deck.shuffle();

        let mut history = Vec::with_capacity(max);
        for (seat, player) in seats.iter_mut().enumerate() {
            let Some(player) = player else { continue };

            let cards = deck.draw(2)?;
            let hand = Hand::new(cards[0], cards[1]);
            player.deal(hand);
            player.coins = config.starting_coins;
            history.push(Action::deal(seat, hand));
        }

        tracing::info!(seats = max, "game created");

        Ok(Self {
            claim: Mutex::new(None),
            forfeit: Mutex::new(None),
            actions: Mutex::new([None, None]),
            players: Mutex::new(seats),
            history: Mutex::new(history),
            deck: Mutex::new(deck),
            drawn: Mutex::new(vec![]),
            turn: Notifier::with_capacity(0, config.notifier_capacity),
            challenges: ChallengeChain::new(config.challenge_window()),
            max,
            config,
        })
    }

    /// `author` claims to hold `character`. Every action is frozen until the
    /// claim is passed or challenged and proven.
    ///
    /// The claimed action must be playable once the claim passes: a primary
    /// by the seat whose turn it is, or a legal counter to the staged primary.
    pub fn claim(&self, author: usize, character: Card) -> Result<()> {
        rejected("claim", self.make_claim(author, character))
    }

    fn make_claim(&self, author: usize, character: Card) -> Result<()> {
        let mut claim = lock(&self.claim);
        if claim.is_some() {
            return Err(GameError::ClaimOngoing);
        }

        if *lock(&self.forfeit) == Some((author, character)) {
            return Err(GameError::ClaimForfeited);
        }

        let staged = lock(&self.actions);
        let players = lock(&self.players);
        let player = players.get(author).and_then(Option::as_ref).ok_or(GameError::InvalidPlayer)?;
        let new = Claim::new(author, player, character)?;

        let claimed = Action::character(author, character);
        match &*staged {
            [None, _] => check_primary(&claimed, self.turn.get(), &*players)?,
            [Some(primary), None] => check_counter(primary, &claimed)?,
            [Some(_), Some(_)] => return Err(GameError::ActionsStaged),
        }

        lock(&self.history).push(new.action());
        *claim = Some(new.with_capacity(self.config.notifier_capacity));

        tracing::info!(seat = author, ?character, "claim made");
        Ok(())
    }

    pub fn claim_pass(&self) -> Result<()> {
        let mut guard = lock(&self.claim);
        let claim = match open_claim(guard.as_mut()) {
            Ok(claim) => claim,
            Err(err) => return rejected("claim_pass", Err(err)),
        };

        claim.pass();
        lock(&self.history).push(claim.action());

        tracing::info!(seat = claim.author(), character = ?claim.character(), "claim passed");
        Ok(())
    }

    pub fn claim_challenge(&self, challenger: usize) -> Result<()> {
        let mut guard = lock(&self.claim);
        let claim = match open_claim(guard.as_mut()) {
            Ok(claim) => claim,
            Err(err) => return rejected("claim_challenge", Err(err)),
        };

        if challenger == claim.author() {
            return rejected("claim_challenge", Err(GameError::SamePlayer));
        }

        if live(&*lock(&self.players), challenger).is_none() {
            return rejected("claim_challenge", Err(GameError::InvalidPlayer));
        }

        claim.challenge();
        lock(&self.history).push(Action {
            author: challenger,
            against: Some(claim.author()),
            ..claim.action()
        });

        tracing::info!(seat = challenger, against = claim.author(), character = ?claim.character(), "claim challenged");
        Ok(())
    }

    /// The claimant reveals `character` to answer a challenge. Returns whether
    /// it was the claimed card.
    ///
    /// Revealing `Empty` declines and always fails. A matching card is
    /// shuffled back into the deck and replaced from it. A failed proof
    /// forfeits the claimed action for the rest of the turn.
    pub fn claim_prove(&self, character: Card) -> Result<bool> {
        rejected("claim_prove", self.prove(character))
    }

    fn prove(&self, character: Card) -> Result<bool> {
        let mut guard = lock(&self.claim);
        let claim = guard.as_mut().ok_or(GameError::ClaimMissing)?;
        match claim.status() {
            ClaimStatus::Open => return Err(GameError::ClaimNotFinished),
            ClaimStatus::Passed => return Err(GameError::ClaimNotChallenged),
            ClaimStatus::Proven { .. } => return Err(GameError::ClaimProven),
            ClaimStatus::Challenged => {}
        }

        let mut forfeit = lock(&self.forfeit);
        let mut players = lock(&self.players);
        let mut history = lock(&self.history);
        let challenge = last_challenge(&history)?;

        let claimant = claim.author();
        let player = players
            .get_mut(claimant)
            .and_then(Option::as_mut)
            .filter(|player| !player.is_dead())
            .ok_or(GameError::InvalidPlayer)?;

        let place = match character {
            Card::Empty => None,
            card => Some(player.hand().position(card).ok_or(GameError::InvalidCharacter)?),
        };

        let matched = place.is_some() && character == challenge.character;
        if let (true, Some(place)) = (matched, place) {
            let replacement = lock(&self.deck).exchange(character)?;
            let hand = player.hand().replace(place, replacement);
            player.set_hand(hand);
        }

        claim.prove(matched)?;
        if !matched {
            *forfeit = Some((claimant, challenge.character));
        }
        history.push(Action {
            author: claimant,
            against: Some(challenge.author),
            character,
            ..Action::new(claimant, ActionKind::ClaimProof)
        });

        tracing::info!(seat = claimant, ?character, matched, "claim proven");
        Ok(matched)
    }

    /// Stages `action` as the primary action, or as the counter or punishment
    /// answering an already staged primary.
    ///
    /// An exchange must carry cards previously taken with `draw_cards`.
    pub fn action(&self, action: Action) -> Result<()> {
        rejected("action", self.stage(action))
    }

    fn stage(&self, action: Action) -> Result<()> {
        let mut claim = lock(&self.claim);
        let forfeit = lock(&self.forfeit);
        let mut staged = lock(&self.actions);
        let players = lock(&self.players);

        action.validate(&*players)?;

        if action.kind == ActionKind::Character && *forfeit == Some((action.author, action.character)) {
            return Err(GameError::ClaimForfeited);
        }

        let consumes_claim = match claim.as_ref().map(|claim| (claim, claim.status())) {
            Some((_, status)) if status.is_frozen() => return Err(GameError::ActionFrozen),
            Some((claim, ClaimStatus::Proven { matched })) => {
                if action.kind != ActionKind::ClaimPunishment {
                    return Err(GameError::ActionFrozen);
                }

                let challenger = last_challenge(&lock(&self.history))?.author;
                let (winner, loser) = if matched {
                    (claim.author(), challenger)
                } else {
                    (challenger, claim.author())
                };
                if action.author != winner || action.against != Some(loser) {
                    return Err(GameError::PunishmentTarget);
                }
                false
            }
            Some((claim, _)) => {
                if action.author != claim.author() {
                    return Err(GameError::InvalidPlayer);
                }
                if action.kind != ActionKind::Character || action.character != claim.character() {
                    return Err(GameError::InvalidCharacter);
                }
                true
            }
            None if action.kind == ActionKind::ClaimPunishment => return Err(GameError::ClaimMissing),
            None => false,
        };

        let punishment = action.kind == ActionKind::ClaimPunishment;
        let slot = match &*staged {
            [None, _] => {
                if !punishment {
                    check_primary(&action, self.turn.get(), &*players)?;
                }
                0
            }
            [Some(primary), None] => {
                if !punishment {
                    check_counter(primary, &action)?;
                }
                1
            }
            [Some(_), Some(_)] => return Err(GameError::ActionsStaged),
        };

        if action.is_exchange() && !holds(&lock(&self.drawn), action.ambassador_hand.cards()) {
            return Err(GameError::InvalidCharacter);
        }

        tracing::info!(seat = action.author, kind = ?action.kind, character = ?action.character, slot, "action staged");
        staged[slot] = Some(action);
        if consumes_claim {
            *claim = None;
        }
        Ok(())
    }

    /// Executes the last staged action.
    ///
    /// A staged counter supersedes the primary: it is recorded and the primary
    /// never happens. A punishment settles the proven claim it answers and
    /// leaves a staged primary in place.
    pub fn do_action(&self) -> Result<Action> {
        rejected("do_action", self.execute_staged())
    }

    fn execute_staged(&self) -> Result<Action> {
        let mut claim = lock(&self.claim);
        let mut staged = lock(&self.actions);

        let (slot, mut action) = match &*staged {
            [_, Some(action)] => (1, action.clone()),
            [Some(action), None] => (0, action.clone()),
            [None, None] => return Err(GameError::NothingStaged),
        };
        let punishment = action.kind == ActionKind::ClaimPunishment;

        let settles_claim = match claim.as_ref().map(Claim::status) {
            None => false,
            Some(ClaimStatus::Proven { .. }) if punishment => true,
            Some(_) => return Err(GameError::ActionFrozen),
        };

        let mut players = lock(&self.players);
        action.validate(&*players)?;

        let blocked = slot == 1 && !punishment;
        let exchanged = !blocked && action.is_exchange();
        let taken = action.ambassador_hand.cards();
        if exchanged && !holds(&lock(&self.drawn), taken) {
            return Err(GameError::InvalidCharacter);
        }

        if !blocked {
            action.execute(&mut *players);
        }

        staged[slot] = None;
        if blocked {
            staged[0] = None;
        }
        // a primary whose author or target fell to the punishment is dropped
        let stale = staged[0].as_ref().is_some_and(|primary| primary.validate(&*players).is_err());
        if stale {
            tracing::debug!("staged primary dropped");
            staged[0] = None;
        }

        let mut history = lock(&self.history);
        if exchanged {
            let mut deck = lock(&self.deck);
            let mut drawn = lock(&self.drawn);
            for card in taken {
                take_card(&mut drawn, card);
            }
            deck.put_back(action.ambassador_hand.cards());
            deck.shuffle();
        }

        history.push(action.clone());
        if settles_claim {
            *claim = None;
        }

        tracing::info!(seat = action.author, kind = ?action.kind, character = ?action.character, blocked, "action executed");
        Ok(action)
    }

    /// Passes the turn to the next seat and announces it.
    ///
    /// Whatever the finished turn left behind is discarded: an outstanding
    /// claim, staged actions, a forfeit, and drawn cards, which go back into
    /// the deck.
    pub fn next_turn(&self) -> Result<usize> {
        if self.max == 0 {
            return rejected("next_turn", Err(GameError::MalformedGame));
        }

        {
            let mut claim = lock(&self.claim);
            let mut forfeit = lock(&self.forfeit);
            let mut staged = lock(&self.actions);
            let mut deck = lock(&self.deck);
            let mut drawn = lock(&self.drawn);

            if let Some(claim) = claim.take() {
                tracing::debug!(seat = claim.author(), status = ?claim.status(), "claim discarded");
            }
            *forfeit = None;
            if staged.iter().any(Option::is_some) {
                tracing::debug!("staged actions discarded");
                *staged = [None, None];
            }
            if !drawn.is_empty() {
                deck.put_back(drawn.drain(..));
                deck.shuffle();
            }
        }

        let turn = self.turn.update(|turn| {
            *turn = (*turn + 1) % self.max;
            *turn
        });
        self.turn.announce();

        tracing::info!(turn, "turn advanced");
        Ok(turn)
    }

    pub fn shuffle(&self) {
        lock(&self.deck).shuffle();
    }

    /// Removes the top `n` cards of the deck for an exchange. They return to
    /// the deck when the exchange executes or the turn ends.
    pub fn draw_cards(&self, n: usize) -> Result<Vec<Card>> {
        let mut deck = lock(&self.deck);
        let cards = rejected("draw_cards", deck.draw(n))?;
        lock(&self.drawn).extend_from_slice(&cards);
        Ok(cards)
    }

    /// Cards taken with `draw_cards` that have not gone back yet.
    pub fn drawn_cards(&self) -> Vec<Card> {
        lock(&self.drawn).clone()
    }

    /// Opens a challenge link for the player at `creator`.
    pub fn challenge(
        &self,
        parent: Option<ChallengeId>,
        creator: usize,
        kind: ChallengeKind,
        versus: Option<usize>,
    ) -> Result<ChallengeId> {
        let players = lock(&self.players);
        let player = players
            .get(creator)
            .and_then(Option::as_ref)
            .ok_or(GameError::InvalidPlayer);

        rejected(
            "challenge",
            player.and_then(|player| self.challenges.open(parent, creator, player, kind, versus)),
        )
    }

    pub fn challenges(&self) -> &ChallengeChain {
        &self.challenges
    }

    pub fn turn(&self) -> usize {
        self.turn.get()
    }

    pub fn claim_status(&self) -> Option<ClaimStatus> {
        lock(&self.claim).as_ref().map(Claim::status)
    }

    pub fn history(&self) -> Vec<Action> {
        lock(&self.history).clone()
    }

    pub fn history_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*lock(&self.history))?)
    }

    pub fn player(&self, seat: usize) -> Option<Player> {
        lock(&self.players).get(seat).cloned().flatten()
    }

    /// Number of occupied seats.
    pub fn seats(&self) -> usize {
        self.max
    }

    pub fn deck_len(&self) -> usize {
        lock(&self.deck).len()
    }

    /// The last seat standing, once every other player is dead.
    pub fn winner(&self) -> Option<usize> {
        let players = lock(&self.players);
        let mut alive = (0..self.max).filter(|&seat| live(&*players, seat).is_some());

        match (alive.next(), alive.next()) {
            (Some(seat), None) => Some(seat),
            _ => None,
        }
    }

    pub fn turn_subscribe(&self) -> (SubscriptionId, Receiver<usize>) {
        self.turn.subscribe()
    }

    pub fn turn_unsubscribe(&self, id: SubscriptionId) -> bool {
        self.turn.unsubscribe(id)
    }

    /// Subscribes to the outstanding claim. The receiver closes once the claim
    /// is consumed or settled.
    pub fn claim_subscribe(&self) -> Result<(SubscriptionId, Receiver<ClaimStatus>)> {
        lock(&self.claim)
            .as_ref()
            .map(Claim::subscribe)
            .ok_or(GameError::ClaimMissing)
    }

    pub fn claim_unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.claim).as_ref().is_some_and(|claim| claim.unsubscribe(id))
    }
}

fn rejected<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        tracing::debug!(operation, %err, "rejected");
    }
    result
}

// turn, forced coup, block-only characters and cost of a primary action
fn check_primary(action: &Action, turn: usize, players: &[Option<Player>]) -> Result<()> {
    if action.author != turn {
        return Err(GameError::OutOfTurn(action.author));
    }

    let coins = players
        .get(action.author)
        .and_then(Option::as_ref)
        .map_or(0, |player| player.coins);
    if coins >= FORCED_COUP_COINS && action.kind != ActionKind::Coup {
        return Err(GameError::CoupRequired);
    }

    if action.is_block_only() {
        return Err(GameError::InvalidCharacter);
    }

    let need = action.cost();
    if coins < need {
        return Err(GameError::InsufficientCoins { need, have: coins });
    }

    Ok(())
}

fn check_counter(primary: &Action, counter: &Action) -> Result<()> {
    if !is_valid_counter_action(primary, counter) {
        return Err(GameError::InvalidCounter);
    }
    if counter.author == primary.author {
        return Err(GameError::SamePlayer);
    }
    // only the target of a targeted action may block it
    if primary.against.is_some_and(|target| target != counter.author) {
        return Err(GameError::InvalidCounter);
    }
    Ok(())
}

fn take_card(pool: &mut Vec<Card>, card: Card) -> bool {
    match pool.iter().position(|&c| c == card) {
        Some(idx) => {
            pool.swap_remove(idx);
            true
        }
        None => false,
    }
}

fn holds(pool: &[Card], cards: [Card; 2]) -> bool {
    let mut pool = pool.to_vec();
    cards.into_iter().all(|card| take_card(&mut pool, card))
}

fn open_claim(claim: Option<&mut Claim>) -> Result<&mut Claim> {
    let claim = claim.ok_or(GameError::ClaimMissing)?;
    if claim.is_finished() {
        return Err(GameError::ClaimFinished);
    }
    Ok(claim)
}

fn last_challenge(history: &[Action]) -> Result<Action> {
    history
        .iter()
        .rev()
        .find(|action| action.kind == ActionKind::ClaimChallenge)
        .cloned()
        .ok_or(GameError::ClaimNotChallenged)
}

fn live(players: &[Option<Player>], seat: usize) -> Option<&Player> {
    players
        .get(seat)
        .and_then(Option::as_ref)
        .filter(|player| !player.is_dead())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::time::Duration;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use crate::Card::{Ambassador, Assassin, Captain, Contessa, Duke, Empty};
    use crate::game::MAX_SEATS;
    use crate::{
        lock, Action, ActionKind, ChallengeKind, ClaimStatus, Game, GameConfig, GameError, Hand,
        Player, CHARACTER_VARIANTS,
    };

    fn seats(n: usize) -> [Option<Player>; MAX_SEATS] {
        std::array::from_fn(|i| (i < n).then(|| Player::new(format!("p{i}"))))
    }

    fn game(n: usize) -> Game {
        Game::new(seats(n), GameConfig::seeded(7)).unwrap()
    }

    fn set_hand(game: &Game, seat: usize, hand: Hand) {
        lock(&game.players)[seat].as_mut().unwrap().deal(hand);
    }

    fn set_coins(game: &Game, seat: usize, coins: u8) {
        lock(&game.players)[seat].as_mut().unwrap().coins = coins;
    }

    fn kinds(game: &Game) -> Vec<ActionKind> {
        game.history().iter().map(|action| action.kind).collect()
    }

    // lost cards stay face up in their slot, so every seat holds two
    fn cards_in_play(game: &Game) -> usize {
        game.deck_len() + game.drawn_cards().len() + 2 * game.seats()
    }

    #[test]
    fn seat_validation() {
        assert_eq!(Game::new(seats(0), GameConfig::default()).err(), Some(GameError::InvalidPlayerAmount));
        assert_eq!(Game::new(seats(1), GameConfig::default()).err(), Some(GameError::InvalidPlayerAmount));

        let mut gap = seats(3);
        gap[1] = None;
        gap[3] = Some(Player::new("p3"));
        assert_eq!(Game::new(gap, GameConfig::default()).err(), Some(GameError::InvalidPlayer));

        let mut dead = Player::with_hand("dead", 0, Hand::new(Duke, Empty));
        dead.set_hand(Hand::default());
        let mut with_dead = seats(2);
        with_dead[2] = Some(dead);
        assert_eq!(Game::new(with_dead, GameConfig::default()).err(), Some(GameError::InvalidPlayer));

        let config = GameConfig { notifier_capacity: 0, ..GameConfig::default() };
        assert!(matches!(Game::new(seats(2), config), Err(GameError::Configuration { .. })));

        assert!(Game::new(seats(5), GameConfig::default()).is_ok());
    }

    #[test]
    fn new_deals_two_cards_each() {
        let game = game(3);

        assert_eq!(game.seats(), 3);
        assert_eq!(game.turn(), 0);
        assert_eq!(game.deck_len(), 9);
        assert_eq!(game.claim_status(), None);
        assert_eq!(game.player(3), None);

        let history = game.history();
        assert_eq!(history.len(), 3);
        for (seat, entry) in history.iter().enumerate() {
            let player = game.player(seat).unwrap();
            assert_eq!(entry.kind, ActionKind::Deal);
            assert_eq!(entry.author, seat);
            assert_eq!(entry.ambassador_hand, player.hand());
            assert!(player.hand().cards().iter().all(|card| card.is_character()));
            assert_eq!(player.coins, 2);
        }
    }

    #[test]
    fn seeded_games_deal_alike() {
        let a = Game::with_rng(seats(4), GameConfig::default(), Pcg64::seed_from_u64(42)).unwrap();
        let b = Game::with_rng(seats(4), GameConfig::default(), Pcg64::seed_from_u64(42)).unwrap();
        assert_eq!(a.history(), b.history());
        assert_eq!(a.history_json().unwrap(), b.history_json().unwrap());

        let c = Game::new(seats(4), GameConfig { starting_coins: 5, ..GameConfig::seeded(42) }).unwrap();
        assert_eq!(a.history(), c.history());
        assert_eq!(c.player(0).unwrap().coins, 5);
    }

    #[test]
    fn proven_duke_claim_punishes_the_challenger() {
        let game = game(2);
        set_hand(&game, 0, Hand::new(Duke, Contessa));
        set_hand(&game, 1, Hand::new(Assassin, Captain));

        game.claim(0, Duke).unwrap();
        assert_eq!(game.claim_status(), Some(ClaimStatus::Open));
        assert_eq!(game.action(Action::tax(0)), Err(GameError::ActionFrozen));

        game.claim_challenge(1).unwrap();
        assert_eq!(game.action(Action::punish(0, 1, 0)), Err(GameError::ActionFrozen));
        assert_eq!(game.claim_prove(Duke), Ok(true));
        assert_eq!(game.claim_status(), Some(ClaimStatus::Proven { matched: true }));

        let history = game.history();
        let (challenge, proof) = (&history[history.len() - 2], &history[history.len() - 1]);
        assert_eq!((challenge.kind, challenge.author, challenge.against), (ActionKind::ClaimChallenge, 1, Some(0)));
        assert_eq!((proof.kind, proof.author, proof.against), (ActionKind::ClaimProof, 0, Some(1)));
        assert_eq!(proof.character, Duke);

        // the revealed duke went back into the deck and was replaced
        assert_eq!(game.deck_len(), 11);
        let claimant = game.player(0).unwrap().hand();
        assert_eq!(claimant.cards()[1], Contessa);
        assert!(claimant.cards()[0].is_character());

        assert_eq!(game.action(Action::tax(0)), Err(GameError::ActionFrozen));
        assert_eq!(game.action(Action::punish(1, 0, 0)), Err(GameError::PunishmentTarget));
        game.action(Action::punish(0, 1, 0)).unwrap();

        let executed = game.do_action().unwrap();
        assert_eq!(executed.kind, ActionKind::ClaimPunishment);
        assert_eq!(game.player(1).unwrap().hand(), Hand::new(Empty, Captain));
        assert_eq!(game.player(0).unwrap().hand(), claimant);
        assert_eq!(game.claim_status(), None);
    }

    #[test]
    fn failed_proof_punishes_the_claimant() {
        let game = game(2);
        set_hand(&game, 0, Hand::new(Assassin, Contessa));

        game.claim(0, Duke).unwrap();
        game.claim_challenge(1).unwrap();

        assert_eq!(game.claim_prove(Captain), Err(GameError::InvalidCharacter));
        assert_eq!(game.claim_prove(Empty), Ok(false));
        assert_eq!(game.claim_prove(Assassin), Err(GameError::ClaimProven));
        assert_eq!(game.claim_status(), Some(ClaimStatus::Proven { matched: false }));
        assert_eq!(game.player(0).unwrap().hand(), Hand::new(Assassin, Contessa));

        assert_eq!(game.action(Action::punish(0, 1, 0)), Err(GameError::PunishmentTarget));
        game.action(Action::punish(1, 0, 1)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().hand(), Hand::new(Assassin, Empty));
    }

    #[test]
    fn disproven_claim_forfeits_its_action() {
        let game = game(2);
        set_hand(&game, 0, Hand::new(Assassin, Captain));

        game.claim(0, Duke).unwrap();
        game.claim_challenge(1).unwrap();
        assert_eq!(game.claim_prove(Empty), Ok(false));
        game.action(Action::punish(1, 0, 0)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.claim_status(), None);

        assert_eq!(game.action(Action::tax(0)), Err(GameError::ClaimForfeited));
        assert_eq!(game.claim(0, Duke), Err(GameError::ClaimForfeited));
        assert_eq!(game.player(0).unwrap().coins, 2);

        // other actions are still open to the liar
        game.action(Action::income(0)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().coins, 3);

        // the forfeit lasts for one turn
        game.next_turn().unwrap();
        game.next_turn().unwrap();
        game.action(Action::tax(0)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().coins, 6);
    }

    #[test]
    fn failed_block_leaves_the_primary() {
        let game = game(2);
        set_coins(&game, 0, 3);
        set_hand(&game, 1, Hand::new(Duke, Captain));

        game.action(Action::assassinate(0, 1, 1)).unwrap();
        game.claim(1, Contessa).unwrap();
        game.claim_challenge(0).unwrap();
        assert_eq!(game.claim_prove(Empty), Ok(false));

        game.action(Action::punish(0, 1, 0)).unwrap();
        assert_eq!(game.do_action().unwrap().kind, ActionKind::ClaimPunishment);
        assert_eq!(game.player(1).unwrap().hand(), Hand::new(Empty, Captain));
        assert_eq!(game.player(0).unwrap().coins, 3);

        assert_eq!(game.action(Action::block(1, 0, Contessa)), Err(GameError::ClaimForfeited));

        let executed = game.do_action().unwrap();
        assert_eq!(executed, Action::assassinate(0, 1, 1));
        assert_eq!(game.player(0).unwrap().coins, 0);
        assert!(game.player(1).unwrap().is_dead());
        assert_eq!(game.winner(), Some(0));
    }

    #[test]
    fn proven_block_still_has_to_be_staged() {
        let game = game(2);
        set_coins(&game, 0, 3);
        set_hand(&game, 1, Hand::new(Contessa, Captain));

        game.action(Action::assassinate(0, 1, 1)).unwrap();
        game.claim(1, Contessa).unwrap();
        game.claim_challenge(0).unwrap();
        assert_eq!(game.claim_prove(Contessa), Ok(true));

        game.action(Action::punish(1, 0, 0)).unwrap();
        game.do_action().unwrap();

        game.action(Action::block(1, 0, Contessa)).unwrap();
        assert_eq!(game.do_action().unwrap(), Action::block(1, 0, Contessa));
        assert_eq!(game.player(0).unwrap().coins, 3);
        assert!(!game.player(1).unwrap().is_dead());
        assert_eq!(game.do_action(), Err(GameError::NothingStaged));
    }

    #[test]
    fn revealing_another_held_card_fails_the_proof() {
        let game = game(2);
        set_hand(&game, 0, Hand::new(Assassin, Contessa));

        game.claim(0, Duke).unwrap();
        game.claim_challenge(1).unwrap();
        assert_eq!(game.claim_prove(Contessa), Ok(false));
        assert_eq!(game.history().last().unwrap().character, Contessa);
        assert_eq!(game.deck_len(), 11);
    }

    #[test]
    fn claim_errors() {
        let game = game(2);

        assert_eq!(game.claim_pass(), Err(GameError::ClaimMissing));
        assert_eq!(game.claim_challenge(1), Err(GameError::ClaimMissing));
        assert_eq!(game.claim_prove(Duke), Err(GameError::ClaimMissing));
        assert_eq!(game.claim(0, Empty), Err(GameError::InvalidCharacter));
        assert_eq!(game.claim(7, Duke), Err(GameError::InvalidPlayer));
        assert!(game.claim_subscribe().is_err());

        game.claim(0, Duke).unwrap();
        assert_eq!(game.claim(1, Captain), Err(GameError::ClaimOngoing));
        assert_eq!(game.claim_challenge(0), Err(GameError::SamePlayer));
        assert_eq!(game.claim_challenge(4), Err(GameError::InvalidPlayer));
        assert_eq!(game.claim_prove(Duke), Err(GameError::ClaimNotFinished));

        game.claim_pass().unwrap();
        assert_eq!(game.claim_pass(), Err(GameError::ClaimFinished));
        assert_eq!(game.claim_challenge(1), Err(GameError::ClaimFinished));
        assert_eq!(game.claim_prove(Duke), Err(GameError::ClaimNotChallenged));

        assert_eq!(&kinds(&game)[2..], &[ActionKind::Claim, ActionKind::ClaimPassed]);
    }

    #[test]
    fn unplayable_claims_are_rejected() {
        let game = game(3);

        // a contessa only ever blocks
        assert_eq!(game.claim(0, Contessa), Err(GameError::InvalidCharacter));
        assert_eq!(game.claim(1, Duke), Err(GameError::OutOfTurn(1)));
        assert_eq!(
            game.claim(0, Assassin),
            Err(GameError::InsufficientCoins { need: 3, have: 2 })
        );

        set_coins(&game, 0, 10);
        assert_eq!(game.claim(0, Duke), Err(GameError::CoupRequired));
        set_coins(&game, 0, 2);

        game.action(Action::financial_aid(0)).unwrap();
        assert_eq!(game.claim(1, Captain), Err(GameError::InvalidCounter));
        assert_eq!(game.claim(0, Duke), Err(GameError::SamePlayer));
        game.claim(2, Duke).unwrap();
        assert_eq!(game.claim_status(), Some(ClaimStatus::Open));
    }

    #[test]
    fn unused_claims_end_with_the_turn() {
        let game = game(2);
        game.claim(0, Duke).unwrap();
        game.claim_pass().unwrap();
        assert_eq!(game.action(Action::income(0)), Err(GameError::InvalidCharacter));

        assert_eq!(game.next_turn(), Ok(1));
        assert_eq!(game.claim_status(), None);
        game.action(Action::income(1)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(1).unwrap().coins, 3);
    }

    #[test]
    fn unexecuted_actions_end_with_the_turn() {
        let game = game(2);
        game.action(Action::income(0)).unwrap();

        game.next_turn().unwrap();
        assert_eq!(game.do_action(), Err(GameError::NothingStaged));
        game.action(Action::income(1)).unwrap();
    }

    #[test]
    fn passed_claim_is_consumed_by_its_action() {
        let game = game(2);
        game.claim(0, Duke).unwrap();
        game.claim_pass().unwrap();

        assert_eq!(game.action(Action::income(0)), Err(GameError::InvalidCharacter));
        assert_eq!(game.action(Action::steal(0, 1)), Err(GameError::InvalidCharacter));
        assert_eq!(game.action(Action::financial_aid(1)), Err(GameError::InvalidPlayer));

        game.action(Action::tax(0)).unwrap();
        assert_eq!(game.claim_status(), None);

        let executed = game.do_action().unwrap();
        assert_eq!(executed, Action::tax(0));
        assert_eq!(game.player(0).unwrap().coins, 5);
    }

    #[test]
    fn punishment_needs_a_claim() {
        let game = game(2);
        assert_eq!(game.action(Action::punish(0, 1, 0)), Err(GameError::ClaimMissing));
    }

    #[test]
    fn financial_aid_countered_by_duke() {
        let game = game(3);
        game.action(Action::financial_aid(0)).unwrap();

        // shape is checked before the counter: a captain needs a target
        assert_eq!(game.action(Action::character(1, Captain)), Err(GameError::InvalidPlayer));
        assert_eq!(game.action(Action::block(1, 0, Captain)), Err(GameError::InvalidCounter));
        assert_eq!(game.action(Action::character(0, Duke)), Err(GameError::SamePlayer));
        game.action(Action::character(1, Duke)).unwrap();

        let executed = game.do_action().unwrap();
        assert_eq!(executed, Action::character(1, Duke));
        assert_eq!(game.player(0).unwrap().coins, 2);
        assert_eq!(game.player(1).unwrap().coins, 2);

        let kinds = kinds(&game);
        assert_eq!(kinds.last(), Some(&ActionKind::Character));
        assert!(!kinds.contains(&ActionKind::FinancialAid));
        assert_eq!(game.do_action(), Err(GameError::NothingStaged));
    }

    #[test]
    fn only_the_target_blocks() {
        let game = game(3);
        game.action(Action::steal(0, 1)).unwrap();

        assert_eq!(game.action(Action::block(2, 0, Captain)), Err(GameError::InvalidCounter));
        game.action(Action::block(1, 0, Captain)).unwrap();
        assert_eq!(game.action(Action::block(2, 0, Captain)), Err(GameError::ActionsStaged));

        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().coins, 2);
        assert_eq!(game.player(1).unwrap().coins, 2);
    }

    #[test]
    fn ambassador_blocks_a_steal() {
        let game = game(2);
        let hand = game.player(1).unwrap().hand();
        game.action(Action::steal(0, 1)).unwrap();

        game.action(Action::block(1, 0, Ambassador)).unwrap();
        let executed = game.do_action().unwrap();

        assert_eq!(executed, Action::block(1, 0, Ambassador));
        assert_eq!(game.player(0).unwrap().coins, 2);
        assert_eq!(game.player(1).unwrap().coins, 2);
        assert_eq!(game.player(1).unwrap().hand(), hand);
        assert_eq!(game.deck_len(), 11);
    }

    #[test]
    fn ambassador_block_is_not_a_primary() {
        let game = game(2);
        assert_eq!(game.action(Action::block(0, 1, Ambassador)), Err(GameError::InvalidCharacter));
    }

    #[test]
    fn primary_rules() {
        let game = game(3);

        assert_eq!(game.do_action(), Err(GameError::NothingStaged));
        assert_eq!(game.action(Action::income(1)), Err(GameError::OutOfTurn(1)));
        assert_eq!(game.action(Action::character(0, Contessa)), Err(GameError::InvalidCharacter));
        assert_eq!(
            game.action(Action::coup(0, 1, 0)),
            Err(GameError::InsufficientCoins { need: 7, have: 2 })
        );

        set_coins(&game, 0, 10);
        assert_eq!(game.action(Action::income(0)), Err(GameError::CoupRequired));
        game.action(Action::coup(0, 1, 0)).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().coins, 3);

        game.next_turn().unwrap();
        game.action(Action::income(1)).unwrap();
        assert_eq!(game.do_action().unwrap().kind, ActionKind::Income);
        assert_eq!(game.player(1).unwrap().coins, 3);
    }

    #[test]
    fn exchange_returns_cards_to_the_deck() {
        let game = game(2);
        let before = game.player(0).unwrap().hand();

        let drawn = game.draw_cards(2).unwrap();
        let drawn = Hand::new(drawn[0], drawn[1]);
        assert_eq!(game.deck_len(), 9);

        game.action(Action::exchange(0, [0, 1], drawn)).unwrap();
        let executed = game.do_action().unwrap();

        assert_eq!(game.player(0).unwrap().hand(), drawn);
        assert_eq!(executed.ambassador_hand, before);
        assert_eq!(game.deck_len(), 11);
        assert!(game.drawn_cards().is_empty());
        assert_eq!(cards_in_play(&game), 15);
    }

    #[test]
    fn exchange_needs_drawn_cards() {
        let game = game(2);
        set_hand(&game, 0, Hand::new(Ambassador, Captain));

        assert_eq!(
            game.action(Action::exchange(0, [0, 1], Hand::new(Duke, Duke))),
            Err(GameError::InvalidCharacter)
        );

        let drawn = game.draw_cards(2).unwrap();
        let undrawn = *CHARACTER_VARIANTS.iter().find(|card| !drawn.contains(card)).unwrap();
        assert_eq!(
            game.action(Action::exchange(0, [0, 1], Hand::new(drawn[0], undrawn))),
            Err(GameError::InvalidCharacter)
        );
        assert_eq!(game.drawn_cards(), drawn);
        assert_eq!(cards_in_play(&game), 15);

        game.action(Action::exchange(0, [0, 1], Hand::new(drawn[0], drawn[1]))).unwrap();
        game.do_action().unwrap();
        assert_eq!(game.player(0).unwrap().hand(), Hand::new(drawn[0], drawn[1]));
        assert!(game.drawn_cards().is_empty());
        assert_eq!(game.deck_len(), 11);

        // drawn cards are spent once
        assert_eq!(
            game.action(Action::exchange(0, [0, 1], Hand::new(drawn[0], drawn[1]))),
            Err(GameError::InvalidCharacter)
        );
    }

    #[test]
    fn drawn_cards_return_when_the_turn_ends() {
        let game = game(2);
        let drawn = game.draw_cards(2).unwrap();
        assert_eq!(game.drawn_cards(), drawn);
        assert_eq!(game.deck_len(), 9);

        // the exchange is rejected out of turn, the cards are not lost
        assert_eq!(
            game.action(Action::exchange(1, [0, 1], Hand::new(drawn[0], drawn[1]))),
            Err(GameError::OutOfTurn(1))
        );
        assert_eq!(cards_in_play(&game), 15);

        game.next_turn().unwrap();
        assert!(game.drawn_cards().is_empty());
        assert_eq!(game.deck_len(), 11);
        assert_eq!(cards_in_play(&game), 15);
    }

    #[test]
    fn deck_maintenance() {
        let game = game(2);
        assert_eq!(
            game.draw_cards(20),
            Err(GameError::DeckExhausted { requested: 20, available: 11 })
        );

        game.shuffle();
        assert_eq!(game.draw_cards(3).unwrap().len(), 3);
        assert_eq!(game.deck_len(), 8);
    }

    #[test]
    fn next_turn_cycles_and_notifies_once() {
        let game = game(3);
        let (_, mut first) = game.turn_subscribe();
        let (second_id, mut second) = game.turn_subscribe();

        for expected in [1, 2, 0] {
            assert_eq!(game.next_turn(), Ok(expected));
            assert_eq!(game.turn(), expected);
            assert_eq!(first.try_recv().unwrap(), expected);
            assert_eq!(second.try_recv().unwrap(), expected);
            assert!(first.try_recv().is_err());
            assert!(second.try_recv().is_err());
        }

        assert!(game.turn_unsubscribe(second_id));
        game.next_turn().unwrap();
        assert_eq!(first.try_recv().unwrap(), 1);
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn last_player_standing_wins() {
        let game = game(2);
        assert_eq!(game.winner(), None);

        set_hand(&game, 1, Hand::new(Duke, Empty));
        set_coins(&game, 0, 7);
        game.action(Action::coup(0, 1, 0)).unwrap();
        game.do_action().unwrap();

        assert!(game.player(1).unwrap().is_dead());
        assert_eq!(game.winner(), Some(0));
        assert_eq!(game.action(Action::income(1)), Err(GameError::InvalidPlayer));
    }

    #[test]
    fn history_serializes() {
        let game = game(2);
        game.claim(0, Duke).unwrap();

        let json = game.history_json().unwrap();
        let parsed: Vec<Action> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, game.history());
    }

    #[test]
    fn challenge_chain_through_the_game() {
        let game = game(2);
        let aid = game.challenge(None, 0, ChallengeKind::FinancialAid, None).unwrap();
        let block = game.challenge(Some(aid), 1, ChallengeKind::CounterDuke, Some(0)).unwrap();

        assert_eq!(game.challenge(None, 3, ChallengeKind::Income, None), Err(GameError::InvalidPlayer));
        assert_eq!(game.challenges().last(aid), Ok(block));

        game.challenges().resolve(block, true).unwrap();
        assert_eq!(game.challenges().outcome(aid), Ok(Some(false)));
    }

    #[test]
    fn one_claim_wins_under_contention() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let game = Arc::new(game(5));
        let handles: Vec<_> = (0..5)
            .map(|seat| {
                let game = game.clone();
                std::thread::spawn(move || game.claim(seat, Captain))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().all(|r| {
            r.is_ok() || matches!(r, Err(GameError::ClaimOngoing | GameError::OutOfTurn(_)))
        }));
        assert_eq!(kinds(&game).iter().filter(|&&k| k == ActionKind::Claim).count(), 1);
    }

    #[test]
    fn pass_and_challenge_race() {
        for _ in 0..50 {
            let game = Arc::new(game(3));
            game.claim(0, Duke).unwrap();
            let start = Arc::new(Barrier::new(2));

            let passer = {
                let (game, start) = (game.clone(), start.clone());
                std::thread::spawn(move || {
                    start.wait();
                    game.claim_pass()
                })
            };
            let challenger = {
                let (game, start) = (game.clone(), start.clone());
                std::thread::spawn(move || {
                    start.wait();
                    game.claim_challenge(1)
                })
            };

            let passed = passer.join().unwrap();
            let challenged = challenger.join().unwrap();
            assert!(passed.is_ok() != challenged.is_ok(), "{passed:?} {challenged:?}");
            assert!([&passed, &challenged].iter().any(|r| **r == Err(GameError::ClaimFinished)));

            let kinds = kinds(&game);
            let passes = kinds.iter().filter(|&&k| k == ActionKind::ClaimPassed).count();
            let challenges = kinds.iter().filter(|&&k| k == ActionKind::ClaimChallenge).count();
            assert_eq!(passes + challenges, 1);

            let expected = if passed.is_ok() { ClaimStatus::Passed } else { ClaimStatus::Challenged };
            assert_eq!(game.claim_status(), Some(expected));
            assert_eq!(passes == 1, passed.is_ok());
        }
    }

    #[test]
    fn claim_waiter_on_a_thread() {
        let game = Arc::new(game(2));
        game.claim(0, Ambassador).unwrap();
        let (_, mut rx) = game.claim_subscribe().unwrap();

        let waiter = std::thread::spawn(move || rx.blocking_recv());
        game.claim_challenge(1).unwrap();

        assert_eq!(waiter.join().unwrap(), Some(ClaimStatus::Challenged));
    }

    #[tokio::test]
    async fn claim_waiter_sees_the_channel_close() {
        let game = Arc::new(game(2));
        game.claim(0, Duke).unwrap();
        let (id, mut rx) = game.claim_subscribe().unwrap();
        assert!(!game.claim_unsubscribe(id + 1));

        let player = game.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            player.claim_pass().unwrap();
            player.action(Action::tax(0)).unwrap();
        });

        let status = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(status, Some(ClaimStatus::Passed));

        // the claim was consumed by the staged tax
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(closed, None);
    }
}
