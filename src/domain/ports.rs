use super::account::Account;
use super::ids::{AccountId, SessionId};
use super::ledger::LedgerEntry;
use super::session::Session;
use crate::error::StoreResult;
use std::sync::Arc;

/// Durable storage for accounts, sessions and ledger entries.
///
/// Reads on the store itself take no locks and may observe slightly stale
/// data. Every mutation goes through a [`LedgerTx`] obtained from
/// [`LedgerStore::begin`].
///
/// Implementations block the calling thread while waiting for row locks, so
/// callers on an async runtime run transactions on the blocking pool.
pub trait LedgerStore: Send + Sync {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>>;

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    fn session(&self, id: SessionId) -> StoreResult<Option<Session>>;
    fn active_session(&self, account_id: AccountId) -> StoreResult<Option<Session>>;
    /// All sessions of an account, oldest first.
    fn sessions(&self, account_id: AccountId) -> StoreResult<Vec<Session>>;
    /// The audit trail of an account in insertion order.
    fn entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>>;
}

/// A single storage transaction.
///
/// Row locks taken through `lock_*` are held until the transaction ends.
/// Dropping a transaction without calling [`LedgerTx::commit`] rolls it back;
/// other transactions never observe its writes.
///
/// Writes are checked against the schema constraints (non-negative balance,
/// ledger math, completed sessions carry a result, one active session per
/// account) and fail with `StorageError::Constraint` when violated.
pub trait LedgerTx {
    /// Locks the account row exclusively and returns its current state.
    fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;
    /// Locks the session row exclusively and returns its current state.
    fn lock_session(&mut self, id: SessionId) -> StoreResult<Option<Session>>;
    /// Unlocked lookup of the account's active session, including writes made
    /// earlier in this transaction.
    fn active_session(&mut self, account_id: AccountId) -> StoreResult<Option<Session>>;

    fn insert_account(&mut self, account: &Account) -> StoreResult<()>;
    fn update_account(&mut self, account: &Account) -> StoreResult<()>;
    fn insert_session(&mut self, session: &Session) -> StoreResult<()>;
    fn update_session(&mut self, session: &Session) -> StoreResult<()>;
    fn append_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()>;
    /// Removes the account together with its sessions and ledger entries.
    /// Returns `false` when the account did not exist.
    fn delete_account(&mut self, id: AccountId) -> StoreResult<bool>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type LedgerStoreFactory = Box<dyn Fn() -> LedgerStoreRef + Send + Sync>;
