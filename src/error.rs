//! Error types for the engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

/// Every way an engine operation can be rejected. A rejected operation never
/// leaves partial changes behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("invalid or dead player")]
    InvalidPlayer,

    #[error("invalid character")]
    InvalidCharacter,

    #[error("invalid place, must be 0 or 1")]
    InvalidPlace,

    #[error("invalid action kind")]
    InvalidActionKind,

    #[error("action author and target are the same player")]
    SamePlayer,

    #[error("claim is still on going")]
    ClaimOngoing,

    #[error("no claim has been made")]
    ClaimMissing,

    #[error("claim hasn't finished")]
    ClaimNotFinished,

    #[error("claim has already finished")]
    ClaimFinished,

    #[error("claim has not been challenged")]
    ClaimNotChallenged,

    #[error("claim has been proven already")]
    ClaimProven,

    #[error("claim was disproven, its action cannot be played this turn")]
    ClaimForfeited,

    #[error("cannot create action because it is frozen by a claim")]
    ActionFrozen,

    #[error("invalid counter")]
    InvalidCounter,

    #[error("players must be 2 to 5")]
    InvalidPlayerAmount,

    #[error("game was not initiated properly")]
    MalformedGame,

    #[error("it is not seat {0}'s turn")]
    OutOfTurn(usize),

    #[error("a player holding 10 or more coins must coup")]
    CoupRequired,

    #[error("not enough coins: need {need}, have {have}")]
    InsufficientCoins { need: u8, have: u8 },

    #[error("two actions are already staged")]
    ActionsStaged,

    #[error("no action has been staged")]
    NothingStaged,

    #[error("punishment must be dealt by the challenge winner to the loser")]
    PunishmentTarget,

    #[error("deck holds {available} cards, cannot draw {requested}")]
    DeckExhausted { requested: usize, available: usize },

    #[error("bad challenge kind: {0}")]
    BadChallengeKind(u8),

    #[error("challenge needs parent challenge")]
    ChallengeNeedsParent,

    #[error("parent challenge window has passed")]
    ChallengePassed,

    #[error("challenge already has response")]
    ChallengeHasResponse,

    #[error("unknown challenge")]
    ChallengeMissing,

    #[error("challenge has already been resolved")]
    ChallengeResolved,

    #[error("bad hand format: {0}")]
    HandFormat(String),

    #[error("configuration error in {field}: {message}")]
    Configuration { field: String, message: String },
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::Configuration {
            field: "json".to_string(),
            message: err.to_string(),
        }
    }
}
