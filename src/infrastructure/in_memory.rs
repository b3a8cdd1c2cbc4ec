use super::locks::{LockTable, RowKey};
use crate::domain::account::{Account, Cents};
use crate::domain::ids::{AccountId, SessionId};
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{LedgerStore, LedgerTx};
use crate::domain::session::Session;
use crate::error::{Constraint, StorageError, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    sessions: HashMap<SessionId, Session>,
    entries: Vec<LedgerEntry>,
}

/// A thread-safe in-memory ledger.
///
/// Committed rows live in `Arc<RwLock<Tables>>`. Transactions stage their
/// writes privately and apply them in one critical section on commit, after
/// re-checking the one-active-session constraint against committed state.
/// Row locks come from a shared [`LockTable`], so concurrent transactions on
/// different accounts never wait on each other.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<LockTable>,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    /// Creates an empty store that waits up to [`DEFAULT_LOCK_TIMEOUT`] for a
    /// row lock.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates an empty store with a custom lock wait.
    ///
    /// # Arguments
    ///
    /// * `lock_timeout` - How long a transaction blocks on a row held by
    ///   another transaction before failing with
    ///   [`StorageError::LockTimeout`]. Nothing is written by the failed
    ///   transaction.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::default(),
            locks: Arc::default(),
            lock_timeout,
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Corrupt("tables poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Corrupt("tables poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        Ok(Box::new(InMemoryTx {
            owner: self.locks.new_owner(),
            store: self,
            held: Vec::new(),
            accounts: HashMap::new(),
            sessions: HashMap::new(),
            entries: Vec::new(),
        }))
    }

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    fn session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        Ok(self.read()?.sessions.get(&id).cloned())
    }

    fn active_session(&self, account_id: AccountId) -> StoreResult<Option<Session>> {
        Ok(self
            .read()?
            .sessions
            .values()
            .find(|s| s.account_id == account_id && s.is_active())
            .cloned())
    }

    fn sessions(&self, account_id: AccountId) -> StoreResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .read()?
            .sessions
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }

    fn entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }
}

struct InMemoryTx<'a> {
    store: &'a InMemoryLedgerStore,
    owner: u64,
    held: Vec<RowKey>,
    /// Staged account rows; `None` marks a deletion.
    accounts: HashMap<AccountId, Option<Account>>,
    sessions: HashMap<SessionId, Session>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryTx<'_> {
    fn lock(&mut self, key: RowKey) -> StoreResult<()> {
        if self
            .store
            .locks
            .acquire(key, self.owner, self.store.lock_timeout)?
        {
            self.held.push(key);
        }
        Ok(())
    }

    fn view_account(&self, tables: &Tables, id: AccountId) -> Option<Account> {
        match self.accounts.get(&id) {
            Some(staged) => staged.clone(),
            None => tables.accounts.get(&id).cloned(),
        }
    }

    fn is_deleted(&self, id: AccountId) -> bool {
        matches!(self.accounts.get(&id), Some(None))
    }

    fn view_active(&self, tables: &Tables, account_id: AccountId) -> Option<Session> {
        if self.is_deleted(account_id) {
            return None;
        }
        self.sessions
            .values()
            .find(|s| s.account_id == account_id && s.is_active())
            .or_else(|| {
                tables.sessions.values().find(|s| {
                    s.account_id == account_id
                        && s.is_active()
                        && !self.sessions.contains_key(&s.id)
                })
            })
            .cloned()
    }

    fn require_account(&self, tables: &Tables, id: AccountId) -> StoreResult<()> {
        match self.view_account(tables, id) {
            Some(_) => Ok(()),
            None => Err(StorageError::Constraint(Constraint::MissingAccount)),
        }
    }
}

fn check_session(session: &Session) -> StoreResult<()> {
    if session.is_consistent() {
        Ok(())
    } else {
        Err(StorageError::Constraint(Constraint::CompletedWithoutResult))
    }
}

fn check_balance(account: &Account) -> StoreResult<()> {
    if account.balance_cents >= Cents::ZERO {
        Ok(())
    } else {
        Err(StorageError::Constraint(Constraint::NegativeBalance))
    }
}

impl LedgerTx for InMemoryTx<'_> {
    fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.lock(RowKey::Account(id))?;
        let tables = self.store.read()?;
        Ok(self.view_account(&tables, id))
    }

    fn lock_session(&mut self, id: SessionId) -> StoreResult<Option<Session>> {
        self.lock(RowKey::Session(id))?;
        if let Some(staged) = self.sessions.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let tables = self.store.read()?;
        Ok(tables
            .sessions
            .get(&id)
            .filter(|s| !self.is_deleted(s.account_id))
            .cloned())
    }

    fn active_session(&mut self, account_id: AccountId) -> StoreResult<Option<Session>> {
        let tables = self.store.read()?;
        Ok(self.view_active(&tables, account_id))
    }

    fn insert_account(&mut self, account: &Account) -> StoreResult<()> {
        check_balance(account)?;
        let tables = self.store.read()?;
        if self.view_account(&tables, account.id).is_some() {
            return Err(StorageError::Constraint(Constraint::DuplicateKey));
        }
        drop(tables);
        self.accounts.insert(account.id, Some(account.clone()));
        Ok(())
    }

    fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        check_balance(account)?;
        let tables = self.store.read()?;
        if self.view_account(&tables, account.id).is_none() {
            return Err(StorageError::Constraint(Constraint::MissingRow));
        }
        drop(tables);
        self.accounts.insert(account.id, Some(account.clone()));
        Ok(())
    }

    fn insert_session(&mut self, session: &Session) -> StoreResult<()> {
        check_session(session)?;
        let tables = self.store.read()?;
        self.require_account(&tables, session.account_id)?;
        if tables.sessions.contains_key(&session.id) || self.sessions.contains_key(&session.id) {
            return Err(StorageError::Constraint(Constraint::DuplicateKey));
        }
        if session.is_active() && self.view_active(&tables, session.account_id).is_some() {
            return Err(StorageError::Constraint(Constraint::ActiveSessionExists));
        }
        drop(tables);
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn update_session(&mut self, session: &Session) -> StoreResult<()> {
        check_session(session)?;
        let tables = self.store.read()?;
        let exists = self.sessions.contains_key(&session.id)
            || tables.sessions.contains_key(&session.id);
        if !exists || self.is_deleted(session.account_id) {
            return Err(StorageError::Constraint(Constraint::MissingRow));
        }
        drop(tables);
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn append_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        if !entry.is_consistent() {
            return Err(StorageError::Constraint(Constraint::LedgerMath));
        }
        let tables = self.store.read()?;
        self.require_account(&tables, entry.account_id)?;
        drop(tables);
        self.entries.push(entry.clone());
        Ok(())
    }

    fn delete_account(&mut self, id: AccountId) -> StoreResult<bool> {
        let tables = self.store.read()?;
        let existed = self.view_account(&tables, id).is_some();
        drop(tables);
        self.accounts.insert(id, None);
        self.sessions.retain(|_, s| s.account_id != id);
        self.entries.retain(|e| e.account_id != id);
        Ok(existed)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tables = self.store.write()?;

        // Another transaction may have committed an active session for the
        // same account after our insert-time check.
        for staged in self.sessions.values().filter(|s| s.is_active()) {
            let conflict = tables.sessions.values().any(|s| {
                s.account_id == staged.account_id
                    && s.id != staged.id
                    && s.is_active()
                    && !self.sessions.contains_key(&s.id)
            });
            if conflict {
                return Err(StorageError::Constraint(Constraint::ActiveSessionExists));
            }
        }

        for (id, staged) in &self.accounts {
            if let Some(account) = staged {
                tables.accounts.insert(*id, account.clone());
            }
        }
        for session in self.sessions.values() {
            tables.sessions.insert(session.id, session.clone());
        }
        tables.entries.extend(self.entries.iter().cloned());

        for (id, staged) in &self.accounts {
            if staged.is_none() {
                tables.accounts.remove(id);
                tables.sessions.retain(|_, s| s.account_id != *id);
                tables.entries.retain(|e| e.account_id != *id);
            }
        }
        Ok(())
    }
}

impl Drop for InMemoryTx<'_> {
    fn drop(&mut self) {
        self.store.locks.release(self.owner, &self.held);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Amount;
    use crate::domain::ledger::{BalanceChange, EntryType};
    use crate::domain::session::{GameKind, Outcome};

    fn seeded(store: &InMemoryLedgerStore, balance: i64) -> Account {
        let account = Account::open(Cents(balance));
        let mut tx = store.begin().unwrap();
        tx.insert_account(&account).unwrap();
        tx.commit().unwrap();
        account
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        assert_eq!(store.account(account.id).unwrap(), Some(account));
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);

        {
            let mut tx = store.begin().unwrap();
            let mut locked = tx.lock_account(account.id).unwrap().unwrap();
            locked.debit(Amount::new(400).unwrap()).unwrap();
            tx.update_account(&locked).unwrap();
            tx.insert_session(&Session::open(
                account.id,
                GameKind::Poker,
                Amount::new(400).unwrap(),
            ))
            .unwrap();
        }

        assert_eq!(
            store.account(account.id).unwrap().unwrap().balance_cents,
            Cents(1_000)
        );
        assert!(store.active_session(account.id).unwrap().is_none());
        // Lock was released on drop.
        let mut tx = store.begin().unwrap();
        assert!(tx.lock_account(account.id).unwrap().is_some());
    }

    #[test]
    fn test_negative_balance_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let mut account = seeded(&store, 10);
        account.balance_cents = Cents(-1);
        let mut tx = store.begin().unwrap();
        assert!(matches!(
            tx.update_account(&account),
            Err(StorageError::Constraint(Constraint::NegativeBalance))
        ));
    }

    #[test]
    fn test_second_active_session_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        let bet = Amount::new(10).unwrap();

        let mut tx = store.begin().unwrap();
        tx.insert_session(&Session::open(account.id, GameKind::Blackjack, bet))
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let result = tx.insert_session(&Session::open(account.id, GameKind::Poker, bet));
        assert!(matches!(
            result,
            Err(StorageError::Constraint(Constraint::ActiveSessionExists))
        ));
    }

    #[test]
    fn test_racing_inserts_fail_at_commit() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        let bet = Amount::new(10).unwrap();

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first
            .insert_session(&Session::open(account.id, GameKind::Blackjack, bet))
            .unwrap();
        second
            .insert_session(&Session::open(account.id, GameKind::Poker, bet))
            .unwrap();

        first.commit().unwrap();
        assert!(matches!(
            second.commit(),
            Err(StorageError::Constraint(Constraint::ActiveSessionExists))
        ));
        assert_eq!(store.sessions(account.id).unwrap().len(), 1);
    }

    #[test]
    fn test_completed_session_requires_result() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        let mut session = Session::open(account.id, GameKind::Blackjack, Amount::new(5).unwrap());
        session.status = crate::domain::session::SessionStatus::Completed;

        let mut tx = store.begin().unwrap();
        assert!(matches!(
            tx.insert_session(&session),
            Err(StorageError::Constraint(Constraint::CompletedWithoutResult))
        ));
    }

    #[test]
    fn test_unbalanced_entry_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        let mut entry = LedgerEntry::record(
            account.id,
            None,
            EntryType::Adjustment,
            BalanceChange {
                before: Cents(1_000),
                after: Cents(900),
            },
            "manual",
        );
        entry.balance_after_cents = Cents(901);

        let mut tx = store.begin().unwrap();
        assert!(matches!(
            tx.append_entry(&entry),
            Err(StorageError::Constraint(Constraint::LedgerMath))
        ));
    }

    #[test]
    fn test_delete_account_cascades() {
        let store = InMemoryLedgerStore::new();
        let account = seeded(&store, 1_000);
        let mut session =
            Session::open(account.id, GameKind::Blackjack, Amount::new(100).unwrap());

        let mut tx = store.begin().unwrap();
        tx.insert_session(&session).unwrap();
        tx.append_entry(&LedgerEntry::record(
            account.id,
            Some(session.id),
            EntryType::Bet,
            BalanceChange {
                before: Cents(1_000),
                after: Cents(900),
            },
            "bet",
        ))
        .unwrap();
        tx.commit().unwrap();

        session.complete(Outcome::Lose, Cents::ZERO).unwrap();
        let mut tx = store.begin().unwrap();
        tx.update_session(&session).unwrap();
        assert!(tx.delete_account(account.id).unwrap());
        assert!(!tx.delete_account(account.id).unwrap());
        tx.commit().unwrap();

        assert!(store.account(account.id).unwrap().is_none());
        assert!(store.sessions(account.id).unwrap().is_empty());
        assert!(store.entries(account.id).unwrap().is_empty());
    }

    #[test]
    fn test_lock_wait_times_out() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(30));
        let account = seeded(&store, 1_000);

        let mut holder = store.begin().unwrap();
        holder.lock_account(account.id).unwrap();

        let mut waiter = store.begin().unwrap();
        assert!(matches!(
            waiter.lock_account(account.id),
            Err(StorageError::LockTimeout)
        ));
    }
}
