use super::ids::AccountId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// A signed amount of money in integer minor units (cents).
///
/// Money never passes through floating point. Arithmetic that could overflow
/// goes through the checked helpers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Self = Self(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl Sub for Cents {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly positive amount, used for bets and credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Cents);

impl Amount {
    pub fn new(value: i64) -> Result<Self, LedgerError> {
        if value > 0 {
            Ok(Self(Cents(value)))
        } else {
            Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn cents(&self) -> Cents {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = LedgerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The financial record owning one player's bankroll.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Never negative in any committed state.
    pub balance_cents: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn open(starting_balance: Cents) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            balance_cents: starting_balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Takes `amount` out of the balance. Leaves the account untouched when
    /// the balance cannot cover it.
    pub fn debit(&mut self, amount: Amount) -> Result<Cents, LedgerError> {
        let next = self
            .balance_cents
            .checked_sub(amount.cents())
            .filter(|next| *next >= Cents::ZERO)
            .ok_or(LedgerError::InsufficientFunds)?;
        self.balance_cents = next;
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Adds a non-negative `amount` to the balance. A zero credit still
    /// touches `updated_at`.
    pub fn credit(&mut self, amount: Cents) -> Result<Cents, LedgerError> {
        if amount < Cents::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "credit must not be negative, got {amount}"
            )));
        }
        let next = self
            .balance_cents
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount("balance overflow".to_string()))?;
        self.balance_cents = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}
