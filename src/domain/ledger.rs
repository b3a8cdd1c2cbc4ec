use super::account::Cents;
use super::ids::{AccountId, EntryId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Bet,
    Win,
    Refund,
    Bonus,
    Adjustment,
}

/// Balance of an account on either side of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Cents,
    pub after: Cents,
}

impl BalanceChange {
    pub fn amount(&self) -> Cents {
        self.after - self.before
    }
}

/// One immutable, balance-affecting audit record.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    /// `None` for transactions outside a session, such as bonuses.
    pub session_id: Option<SessionId>,
    pub entry_type: EntryType,
    /// Negative for debits, positive for credits.
    pub amount_cents: Cents,
    pub balance_before_cents: Cents,
    pub balance_after_cents: Cents,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Builds the entry from the balance change so the amount always matches
    /// the difference between both balances.
    pub fn record(
        account_id: AccountId,
        session_id: Option<SessionId>,
        entry_type: EntryType,
        change: BalanceChange,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            account_id,
            session_id,
            entry_type,
            amount_cents: change.amount(),
            balance_before_cents: change.before,
            balance_after_cents: change.after,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// `balance_after = balance_before + amount`.
    pub fn is_consistent(&self) -> bool {
        self.balance_before_cents
            .checked_add(self.amount_cents)
            .is_some_and(|after| after == self.balance_after_cents)
    }
}
