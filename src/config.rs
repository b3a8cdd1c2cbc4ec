use crate::domain::account::{Amount, Cents};
use crate::domain::session::GameKind;
use crate::error::{ConfigError, LedgerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INTERNAL_API_KEY: &str = "dev-internal-key-change-me";
/// Upper bound on `lock_timeout_ms`: one hour.
pub const MAX_LOCK_TIMEOUT_MS: u64 = 3_600_000;

/// Betting limits and availability for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub game: GameKind,
    pub name: String,
    pub min_bet_cents: i64,
    pub max_bet_cents: i64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl GameConfig {
    /// Validates a bet against this game's limits.
    pub fn check_bet(&self, bet_cents: i64) -> Result<Amount, LedgerError> {
        if !self.enabled {
            return Err(LedgerError::GameDisabled);
        }
        if bet_cents < self.min_bet_cents {
            return Err(LedgerError::InvalidBet(format!(
                "bet {bet_cents} is below the {} minimum of {}",
                self.game, self.min_bet_cents
            )));
        }
        if bet_cents > self.max_bet_cents {
            return Err(LedgerError::InvalidBet(format!(
                "bet {bet_cents} exceeds the {} maximum of {}",
                self.game, self.max_bet_cents
            )));
        }
        Amount::new(bet_cents).map_err(|_| LedgerError::InvalidBet("bet must be positive".into()))
    }
}

/// Ledger configuration. Every field has a default, so a partial JSON file is
/// valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub starting_balance_cents: i64,
    pub lock_timeout_ms: u64,
    /// Shared secret presented by trusted game-rule engines.
    pub internal_api_key: String,
    pub games: Vec<GameConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance_cents: 250_000,
            lock_timeout_ms: 5_000,
            internal_api_key: DEFAULT_INTERNAL_API_KEY.to_string(),
            games: vec![
                GameConfig {
                    game: GameKind::Blackjack,
                    name: "Blackjack".to_string(),
                    min_bet_cents: 100,
                    max_bet_cents: 10_000,
                    enabled: true,
                },
                GameConfig {
                    game: GameKind::Poker,
                    name: "Texas Hold'em Poker".to_string(),
                    min_bet_cents: 500,
                    max_bet_cents: 50_000,
                    enabled: true,
                },
            ],
        }
    }
}

impl LedgerConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_balance_cents <= 0 {
            return Err(ConfigError::Invalid(
                "starting_balance_cents must be positive".to_string(),
            ));
        }
        if self.lock_timeout_ms > MAX_LOCK_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "lock_timeout_ms must not exceed {MAX_LOCK_TIMEOUT_MS}"
            )));
        }
        if self.internal_api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "internal_api_key must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for game in &self.games {
            if !seen.insert(game.game) {
                return Err(ConfigError::Invalid(format!(
                    "game {} is configured twice",
                    game.game
                )));
            }
            if game.min_bet_cents <= 0 || game.min_bet_cents > game.max_bet_cents {
                return Err(ConfigError::Invalid(format!(
                    "game {} needs 0 < min_bet_cents <= max_bet_cents",
                    game.game
                )));
            }
        }
        Ok(())
    }

    pub fn game(&self, kind: GameKind) -> Option<&GameConfig> {
        self.games.iter().find(|g| g.game == kind)
    }

    pub fn starting_balance(&self) -> Cents {
        Cents(self.starting_balance_cents)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn uses_default_key(&self) -> bool {
        self.internal_api_key == DEFAULT_INTERNAL_API_KEY
    }
}
