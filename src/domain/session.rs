use super::account::{Amount, Cents};
use super::ids::{AccountId, SessionId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Blackjack,
    Poker,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Blackjack => "blackjack",
            GameKind::Poker => "poker",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// Result classification reported by a game-rule engine.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Push,
    Blackjack,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
            Outcome::Push => "push",
            Outcome::Blackjack => "blackjack",
        };
        f.write_str(s)
    }
}

/// One wagering round, from bet placement to settlement or forfeiture.
///
/// The only transitions are `active -> completed` and `active -> abandoned`;
/// both are terminal.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    pub game: GameKind,
    pub status: SessionStatus,
    pub bet_cents: Cents,
    pub result: Option<Outcome>,
    pub payout_cents: Cents,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(account_id: AccountId, game: GameKind, bet: Amount) -> Self {
        Self {
            id: SessionId::generate(),
            account_id,
            game,
            status: SessionStatus::Active,
            bet_cents: bet.cents(),
            result: None,
            payout_cents: Cents::ZERO,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// `status = completed => result is not null`.
    pub fn is_consistent(&self) -> bool {
        self.status != SessionStatus::Completed || self.result.is_some()
    }

    pub fn complete(&mut self, result: Outcome, payout: Cents) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::SessionNotActive);
        }
        if payout < Cents::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "payout must not be negative, got {payout}"
            )));
        }
        self.status = SessionStatus::Completed;
        self.result = Some(result);
        self.payout_cents = payout;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Forfeits the round. The bet posted at open time stands.
    pub fn abandon(&mut self) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::NoActiveSession);
        }
        self.status = SessionStatus::Abandoned;
        self.result = Some(Outcome::Lose);
        self.payout_cents = Cents::ZERO;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
