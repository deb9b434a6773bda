//! Engine configuration

use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::action::MAX_COINS;
use crate::notifier::DEFAULT_CAPACITY;
use crate::{GameError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seed for deck shuffles. Fresh entropy is used when unset.
    pub seed: Option<u64>,
    /// Coins each player starts with
    pub starting_coins: u8,
    /// Buffered announcements per subscriber before they are dropped
    pub notifier_capacity: usize,
    /// How long a challenge link may be answered (milliseconds)
    pub challenge_window_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: None,
            starting_coins: 2,
            notifier_capacity: DEFAULT_CAPACITY,
            challenge_window_ms: 10_000,
        }
    }
}

impl GameConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GameError::Configuration {
            field: "config_file".to_string(),
            message: format!("Failed to read config file: {}", e),
        })?;

        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.notifier_capacity == 0 {
            return Err(GameError::Configuration {
                field: "notifier_capacity".to_string(),
                message: "Notifier capacity must be greater than 0".to_string(),
            });
        }

        if self.starting_coins > MAX_COINS {
            return Err(GameError::Configuration {
                field: "starting_coins".to_string(),
                message: format!("Starting coins must be at most {}", MAX_COINS),
            });
        }

        Ok(())
    }

    pub fn challenge_window(&self) -> Duration {
        Duration::from_millis(self.challenge_window_ms)
    }
}
