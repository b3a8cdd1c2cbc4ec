use crate::domain::account::{Account, Amount, Cents};
use crate::domain::ids::AccountId;
use crate::domain::ledger::BalanceChange;
use crate::domain::ports::LedgerTx;
use crate::error::{LedgerError, Result};

/// Exclusive hold on one account row for the life of a transaction.
///
/// This is the only code path that reads, modifies and writes
/// `balance_cents`. Changes are written into the caller's transaction and only
/// become visible when the caller commits it.
pub struct AccountGuard<'t, T: LedgerTx + ?Sized> {
    tx: &'t mut T,
    account: Account,
}

impl<'t, T: LedgerTx + ?Sized> AccountGuard<'t, T> {
    /// Locks the account row, failing with `NotFound` if it does not exist.
    pub fn lock(tx: &'t mut T, account_id: AccountId) -> Result<Self> {
        let account = tx.lock_account(account_id)?.ok_or(LedgerError::NotFound)?;
        Ok(Self { tx, account })
    }

    pub fn balance(&self) -> Cents {
        self.account.balance_cents
    }

    /// Fails with `InsufficientFunds` without writing anything when the
    /// balance cannot cover `amount`.
    pub fn debit(mut self, amount: Amount) -> Result<BalanceChange> {
        let before = self.account.balance_cents;
        let after = self.account.debit(amount)?;
        self.tx.update_account(&self.account)?;
        Ok(BalanceChange { before, after })
    }

    /// Credits never fail on balance grounds; `amount` may be zero.
    pub fn credit(mut self, amount: Cents) -> Result<BalanceChange> {
        let before = self.account.balance_cents;
        let after = self.account.credit(amount)?;
        self.tx.update_account(&self.account)?;
        Ok(BalanceChange { before, after })
    }
}
