//! Chained contests: an action may be countered, the counter confronted, and
//! so on. Each link in a chain answers the one before it.
//!
//! Links live in a graph arena and are addressed by `ChallengeId`, an edge
//! points from a link to its response. A link with a response succeeds iff
//! its response does not, so the outcome of any link is read off the terminal
//! link of its chain.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use crate::notifier::Notifier;
use crate::{lock, GameError, Player, Result};

pub type ChallengeId = NodeIndex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChallengeKind {
    // demand proof of any character action or counter
    Confront = 1,
    // take 1 coin, unstoppable
    Income,
    // take 2 coins, a duke prevents it
    FinancialAid,
    // kill a card for 7 coins, unstoppable
    Coup,
    // kill a card for 3 coins, a contessa prevents it
    ActionAssassin,
    // take 3 coins
    ActionDuke,
    // steal 2 coins, a captain or an ambassador prevents it
    ActionCaptain,
    // swap cards with the deck
    ActionAmbassador,
    CounterDuke,
    CounterCaptain,
    CounterAmbassador,
    CounterContessa,
}

impl ChallengeKind {
    pub fn is_counter(self) -> bool {
        matches!(
            self,
            ChallengeKind::CounterDuke
                | ChallengeKind::CounterCaptain
                | ChallengeKind::CounterAmbassador
                | ChallengeKind::CounterContessa
        )
    }
}

impl TryFrom<u8> for ChallengeKind {
    type Error = GameError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use ChallengeKind::*;
        Ok(match value {
            1 => Confront,
            2 => Income,
            3 => FinancialAid,
            4 => Coup,
            5 => ActionAssassin,
            6 => ActionDuke,
            7 => ActionCaptain,
            8 => ActionAmbassador,
            9 => CounterDuke,
            10 => CounterCaptain,
            11 => CounterAmbassador,
            12 => CounterContessa,
            _ => return Err(GameError::BadChallengeKind(value)),
        })
    }
}

/// Whether `counter` may answer a link of kind `action`; `None` asks whether
/// `counter` may start a chain.
pub fn is_counter_challenge_valid(action: Option<ChallengeKind>, counter: ChallengeKind) -> bool {
    use ChallengeKind::*;
    match action {
        // counters and confronts need something to answer
        None => !(counter.is_counter() || counter == Confront),
        Some(FinancialAid) => counter == CounterDuke,
        Some(ActionAssassin) => matches!(counter, CounterContessa | Confront),
        Some(ActionCaptain) => matches!(counter, Confront | CounterCaptain | CounterAmbassador),
        Some(Income) | Some(Coup) | Some(Confront) => false,
        Some(_) => counter == Confront,
    }
}

#[derive(Clone, Debug)]
struct Challenge {
    creator: usize,
    kind: ChallengeKind,
    versus: Option<usize>,
    deadline: Instant,
    succeed: Option<bool>,
}

/// An arena of challenge chains shared by the players of one match.
pub struct ChallengeChain {
    graph: Mutex<DiGraph<Challenge, ()>>,
    // announces the id of every link that gets resolved
    resolved: Notifier<Option<ChallengeId>>,
    window: Duration,
}

impl ChallengeChain {
    pub fn new(window: Duration) -> Self {
        Self {
            graph: Mutex::new(DiGraph::new()),
            resolved: Notifier::new(None),
            window,
        }
    }

    /// Opens a link answering `parent` (or a new chain) that can be answered
    /// itself until the chain's window elapses.
    pub fn open(
        &self,
        parent: Option<ChallengeId>,
        creator: usize,
        player: &Player,
        kind: ChallengeKind,
        versus: Option<usize>,
    ) -> Result<ChallengeId> {
        self.open_with_window(parent, creator, player, kind, versus, self.window)
    }

    pub fn open_with_window(
        &self,
        parent: Option<ChallengeId>,
        creator: usize,
        player: &Player,
        kind: ChallengeKind,
        versus: Option<usize>,
        window: Duration,
    ) -> Result<ChallengeId> {
        if player.is_dead() {
            return Err(GameError::InvalidPlayer);
        }

        let mut graph = lock(&self.graph);

        match parent {
            Some(parent) => {
                let link = graph.node_weight(parent).ok_or(GameError::ChallengeMissing)?;
                if Instant::now() >= link.deadline {
                    return Err(GameError::ChallengePassed);
                }
                if !is_counter_challenge_valid(Some(link.kind), kind) {
                    return Err(GameError::InvalidCounter);
                }
                if link.succeed.is_some() {
                    return Err(GameError::ChallengeResolved);
                }
                if graph.neighbors_directed(parent, Direction::Outgoing).next().is_some() {
                    return Err(GameError::ChallengeHasResponse);
                }
            }
            None => {
                if !is_counter_challenge_valid(None, kind) {
                    return Err(GameError::ChallengeNeedsParent);
                }
            }
        }

        let id = graph.add_node(Challenge {
            creator,
            kind,
            versus,
            deadline: Instant::now() + window,
            succeed: None,
        });
        if let Some(parent) = parent {
            graph.add_edge(parent, id, ());
        }

        tracing::debug!(seat = creator, ?kind, ?parent, "challenge opened");
        Ok(id)
    }

    pub fn kind(&self, id: ChallengeId) -> Result<ChallengeKind> {
        self.with_link(id, |link| link.kind)
    }

    pub fn creator(&self, id: ChallengeId) -> Result<usize> {
        self.with_link(id, |link| link.creator)
    }

    pub fn versus(&self, id: ChallengeId) -> Result<Option<usize>> {
        self.with_link(id, |link| link.versus)
    }

    /// True once the link's answer window has elapsed.
    pub fn passed(&self, id: ChallengeId) -> Result<bool> {
        self.with_link(id, |link| Instant::now() >= link.deadline)
    }

    pub fn response(&self, id: ChallengeId) -> Result<Option<ChallengeId>> {
        let graph = lock(&self.graph);
        graph.node_weight(id).ok_or(GameError::ChallengeMissing)?;
        Ok(graph.neighbors_directed(id, Direction::Outgoing).next())
    }

    pub fn parent(&self, id: ChallengeId) -> Result<Option<ChallengeId>> {
        let graph = lock(&self.graph);
        graph.node_weight(id).ok_or(GameError::ChallengeMissing)?;
        Ok(graph.neighbors_directed(id, Direction::Incoming).next())
    }

    /// The final, unanswered link of the chain `id` belongs to.
    pub fn last(&self, id: ChallengeId) -> Result<ChallengeId> {
        let graph = lock(&self.graph);
        graph.node_weight(id).ok_or(GameError::ChallengeMissing)?;
        Ok(walk(&graph, id).0)
    }

    /// Settles an unanswered link.
    pub fn resolve(&self, id: ChallengeId, succeeded: bool) -> Result<()> {
        {
            let mut graph = lock(&self.graph);
            if graph.neighbors_directed(id, Direction::Outgoing).next().is_some() {
                return Err(GameError::ChallengeHasResponse);
            }

            let link = graph.node_weight_mut(id).ok_or(GameError::ChallengeMissing)?;
            if link.succeed.is_some() {
                return Err(GameError::ChallengeResolved);
            }
            link.succeed = Some(succeeded);
        }

        tracing::info!(challenge = id.index(), succeeded, "challenge resolved");
        self.resolved.set(Some(id));
        self.resolved.announce();
        Ok(())
    }

    /// The outcome of `id`, or `None` while its terminal link is unresolved.
    pub fn outcome(&self, id: ChallengeId) -> Result<Option<bool>> {
        let graph = lock(&self.graph);
        graph.node_weight(id).ok_or(GameError::ChallengeMissing)?;

        let (last, hops) = walk(&graph, id);
        Ok(graph[last].succeed.map(|succeed| succeed ^ (hops % 2 == 1)))
    }

    /// Waits until the terminal link of `id`'s chain is resolved.
    pub async fn wait_outcome(&self, id: ChallengeId) -> Result<bool> {
        let (subscription, mut rx) = self.resolved.subscribe();

        let outcome = loop {
            match self.outcome(id) {
                Ok(Some(outcome)) => break Ok(outcome),
                Ok(None) => {}
                Err(err) => break Err(err),
            }

            if rx.recv().await.is_none() {
                break Err(GameError::ChallengeMissing);
            }
        };

        self.resolved.unsubscribe(subscription);
        outcome
    }

    pub fn len(&self) -> usize {
        lock(&self.graph).node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_link<R>(&self, id: ChallengeId, f: impl FnOnce(&Challenge) -> R) -> Result<R> {
        lock(&self.graph)
            .node_weight(id)
            .map(f)
            .ok_or(GameError::ChallengeMissing)
    }
}

// follows responses to the end of the chain, counting the links passed
fn walk(graph: &DiGraph<Challenge, ()>, from: ChallengeId) -> (ChallengeId, usize) {
    let mut last = from;
    let mut hops = 0;
    while let Some(next) = graph.neighbors_directed(last, Direction::Outgoing).next() {
        last = next;
        hops += 1;
    }
    (last, hops)
}
