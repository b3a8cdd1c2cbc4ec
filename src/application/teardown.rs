use crate::domain::account::Cents;
use crate::domain::ids::AccountId;
use crate::domain::ports::LedgerStore;
use crate::error::Result;
use tracing::info;

/// A bankroll at or below zero ends the player's existence in the system.
pub fn is_bust(balance: Cents) -> bool {
    balance <= Cents::ZERO
}

/// Permanently deletes a bust account together with its sessions and ledger
/// history, in one transaction.
///
/// The balance is re-read under the account lock; an account that was
/// credited in the meantime is left alone. Deleting an account that no longer
/// exists is a no-op. Returns whether the account was deleted.
pub fn teardown_account(store: &dyn LedgerStore, account_id: AccountId) -> Result<bool> {
    let mut tx = store.begin()?;
    let Some(account) = tx.lock_account(account_id)? else {
        return Ok(false);
    };
    if !is_bust(account.balance_cents) {
        return Ok(false);
    }
    let deleted = tx.delete_account(account_id)?;
    tx.commit()?;
    if deleted {
        info!(account = %account_id, "bankroll exhausted, account deleted");
    }
    Ok(deleted)
}
