use crate::domain::account::{Account, Cents};
use crate::domain::ids::{AccountId, SessionId};
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{LedgerStore, LedgerTx};
use crate::domain::session::Session;
use crate::error::{Constraint, StorageError, StoreResult};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, Options,
    Transaction, TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Column Family for account rows, keyed by account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for session rows, keyed by session id.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family for ledger entries, keyed by account id ++ entry id.
pub const CF_LEDGER: &str = "ledger";
/// account id -> id of its single active session.
pub const CF_ACTIVE_SESSIONS: &str = "active_sessions";
/// account id ++ session id -> (), ownership index used for listing and cascade.
pub const CF_ACCOUNT_SESSIONS: &str = "account_sessions";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_ACCOUNTS,
    CF_SESSIONS,
    CF_LEDGER,
    CF_ACTIVE_SESSIONS,
    CF_ACCOUNT_SESSIONS,
];

/// A persistent ledger backed by a pessimistic RocksDB `TransactionDB`.
///
/// Row locks are `get_for_update` on the row key and are bounded by the
/// configured lock timeout. The one-active-session rule is structural: the
/// `active_sessions` family holds at most one key per account, and claiming
/// it requires the key lock.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDbLedgerStore {
    db: Arc<TransactionDB>,
    lock_timeout_ms: i64,
}

fn backend(e: rocksdb::Error) -> StorageError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::Busy | ErrorKind::TryAgain => StorageError::LockTimeout,
        _ => StorageError::Backend(Box::new(e)),
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::Corrupt(format!("serialization: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt(format!("deserialization: {e}")))
}

fn compound_key(prefix: &[u8; 16], suffix: &[u8; 16]) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(prefix);
    key[16..].copy_from_slice(suffix);
    key
}

fn cf<'a>(db: &'a TransactionDB, name: &str) -> StoreResult<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| StorageError::Corrupt(format!("column family {name} not found")))
}

impl RocksDbLedgerStore {
    /// Opens or creates a ledger database at `path`.
    ///
    /// Ensures that every column family (`accounts`, `sessions`, `ledger` and
    /// the two session indexes) exists. RocksDB treats a negative lock timeout
    /// as an unbounded wait, so a timeout that does not fit in `i64`
    /// milliseconds is rejected.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    /// * `lock_timeout` - How long a transaction waits for a row lock before
    ///   failing with [`StorageError::LockTimeout`].
    pub fn open<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> StoreResult<Self> {
        let timeout_ms = i64::try_from(lock_timeout.as_millis())
            .map_err(|e| StorageError::Backend(Box::new(e)))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(timeout_ms);
        txn_db_opts.set_default_lock_timeout(timeout_ms);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(&opts, &txn_db_opts, path, descriptors)
            .map_err(backend)?;

        Ok(Self {
            db: Arc::new(db),
            lock_timeout_ms: timeout_ms,
        })
    }

    fn get<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> StoreResult<Option<T>> {
        let handle = cf(&self.db, family)?;
        match self.db.get_cf(handle, key).map_err(backend)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, family: &str, prefix: &[u8]) -> StoreResult<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let handle = cf(&self.db, family)?;
        let mut rows = Vec::new();
        for item in self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(backend)?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }
}

impl LedgerStore for RocksDbLedgerStore {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);
        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        Ok(Box::new(RocksDbTx {
            db: self.db.as_ref(),
            txn,
        }))
    }

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.get(CF_ACCOUNTS, id.as_bytes())
    }

    fn session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        self.get(CF_SESSIONS, id.as_bytes())
    }

    fn active_session(&self, account_id: AccountId) -> StoreResult<Option<Session>> {
        let handle = cf(&self.db, CF_ACTIVE_SESSIONS)?;
        match self.db.get_cf(handle, account_id.as_bytes()).map_err(backend)? {
            Some(bytes) => {
                let id = SessionId::from_slice(&bytes)
                    .ok_or_else(|| StorageError::Corrupt("active session index".to_string()))?;
                self.session(id)
            }
            None => Ok(None),
        }
    }

    fn sessions(&self, account_id: AccountId) -> StoreResult<Vec<Session>> {
        let mut sessions = Vec::new();
        for (key, _) in self.scan_prefix(CF_ACCOUNT_SESSIONS, account_id.as_bytes())? {
            let id = SessionId::from_slice(&key[16..])
                .ok_or_else(|| StorageError::Corrupt("account session index".to_string()))?;
            if let Some(session) = self.session(id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        self.scan_prefix(CF_LEDGER, account_id.as_bytes())?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }
}

struct RocksDbTx<'a> {
    db: &'a TransactionDB,
    txn: Transaction<'a, TransactionDB>,
}

impl RocksDbTx<'_> {
    fn get_for_update<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> StoreResult<Option<T>> {
        let handle = cf(self.db, family)?;
        match self.txn.get_for_update_cf(handle, key, true).map_err(backend)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn get<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> StoreResult<Option<T>> {
        let handle = cf(self.db, family)?;
        match self.txn.get_cf(handle, key).map_err(backend)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, family: &str, key: &[u8], value: &T) -> StoreResult<()> {
        let handle = cf(self.db, family)?;
        self.txn.put_cf(handle, key, encode(value)?).map_err(backend)
    }

    fn delete(&self, family: &str, key: &[u8]) -> StoreResult<()> {
        let handle = cf(self.db, family)?;
        self.txn.delete_cf(handle, key).map_err(backend)
    }

    fn keys_with_prefix(&self, family: &str, prefix: &[u8]) -> StoreResult<Vec<Box<[u8]>>> {
        let handle = cf(self.db, family)?;
        let mut keys = Vec::new();
        for item in self
            .txn
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(backend)?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    fn active_session_id(&self, account_id: AccountId, lock: bool) -> StoreResult<Option<SessionId>> {
        let handle = cf(self.db, CF_ACTIVE_SESSIONS)?;
        let raw = if lock {
            self.txn
                .get_for_update_cf(handle, account_id.as_bytes(), true)
                .map_err(backend)?
        } else {
            self.txn.get_cf(handle, account_id.as_bytes()).map_err(backend)?
        };
        raw.map(|bytes| {
            SessionId::from_slice(&bytes)
                .ok_or_else(|| StorageError::Corrupt("active session index".to_string()))
        })
        .transpose()
    }

    fn require_account(&self, id: AccountId) -> StoreResult<()> {
        match self.get::<Account>(CF_ACCOUNTS, id.as_bytes())? {
            Some(_) => Ok(()),
            None => Err(StorageError::Constraint(Constraint::MissingAccount)),
        }
    }

    /// Keeps the `active_sessions` index in step with the session's status.
    fn index_active(&self, session: &Session) -> StoreResult<()> {
        let current = self.active_session_id(session.account_id, true)?;
        match (session.is_active(), current) {
            (true, Some(other)) if other != session.id => {
                Err(StorageError::Constraint(Constraint::ActiveSessionExists))
            }
            (true, _) => {
                let handle = cf(self.db, CF_ACTIVE_SESSIONS)?;
                self.txn
                    .put_cf(handle, session.account_id.as_bytes(), session.id.as_bytes())
                    .map_err(backend)
            }
            (false, Some(active)) if active == session.id => {
                self.delete(CF_ACTIVE_SESSIONS, session.account_id.as_bytes())
            }
            (false, _) => Ok(()),
        }
    }
}

impl LedgerTx for RocksDbTx<'_> {
    fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.get_for_update(CF_ACCOUNTS, id.as_bytes())
    }

    fn lock_session(&mut self, id: SessionId) -> StoreResult<Option<Session>> {
        self.get_for_update(CF_SESSIONS, id.as_bytes())
    }

    fn active_session(&mut self, account_id: AccountId) -> StoreResult<Option<Session>> {
        match self.active_session_id(account_id, false)? {
            Some(id) => self.get(CF_SESSIONS, id.as_bytes()),
            None => Ok(None),
        }
    }

    fn insert_account(&mut self, account: &Account) -> StoreResult<()> {
        if account.balance_cents < Cents::ZERO {
            return Err(StorageError::Constraint(Constraint::NegativeBalance));
        }
        if self
            .get_for_update::<Account>(CF_ACCOUNTS, account.id.as_bytes())?
            .is_some()
        {
            return Err(StorageError::Constraint(Constraint::DuplicateKey));
        }
        self.put(CF_ACCOUNTS, account.id.as_bytes(), account)
    }

    fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        if account.balance_cents < Cents::ZERO {
            return Err(StorageError::Constraint(Constraint::NegativeBalance));
        }
        if self
            .get_for_update::<Account>(CF_ACCOUNTS, account.id.as_bytes())?
            .is_none()
        {
            return Err(StorageError::Constraint(Constraint::MissingRow));
        }
        self.put(CF_ACCOUNTS, account.id.as_bytes(), account)
    }

    fn insert_session(&mut self, session: &Session) -> StoreResult<()> {
        if !session.is_consistent() {
            return Err(StorageError::Constraint(Constraint::CompletedWithoutResult));
        }
        self.require_account(session.account_id)?;
        if self
            .get_for_update::<Session>(CF_SESSIONS, session.id.as_bytes())?
            .is_some()
        {
            return Err(StorageError::Constraint(Constraint::DuplicateKey));
        }
        self.index_active(session)?;
        self.put(CF_SESSIONS, session.id.as_bytes(), session)?;
        let handle = cf(self.db, CF_ACCOUNT_SESSIONS)?;
        self.txn
            .put_cf(
                handle,
                compound_key(session.account_id.as_bytes(), session.id.as_bytes()),
                b"",
            )
            .map_err(backend)
    }

    fn update_session(&mut self, session: &Session) -> StoreResult<()> {
        if !session.is_consistent() {
            return Err(StorageError::Constraint(Constraint::CompletedWithoutResult));
        }
        if self
            .get_for_update::<Session>(CF_SESSIONS, session.id.as_bytes())?
            .is_none()
        {
            return Err(StorageError::Constraint(Constraint::MissingRow));
        }
        self.index_active(session)?;
        self.put(CF_SESSIONS, session.id.as_bytes(), session)
    }

    fn append_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        if !entry.is_consistent() {
            return Err(StorageError::Constraint(Constraint::LedgerMath));
        }
        self.require_account(entry.account_id)?;
        self.put(
            CF_LEDGER,
            &compound_key(entry.account_id.as_bytes(), entry.id.as_bytes()),
            entry,
        )
    }

    fn delete_account(&mut self, id: AccountId) -> StoreResult<bool> {
        if self
            .get_for_update::<Account>(CF_ACCOUNTS, id.as_bytes())?
            .is_none()
        {
            return Ok(false);
        }
        for key in self.keys_with_prefix(CF_ACCOUNT_SESSIONS, id.as_bytes())? {
            self.delete(CF_SESSIONS, &key[16..])?;
            self.delete(CF_ACCOUNT_SESSIONS, &key)?;
        }
        for key in self.keys_with_prefix(CF_LEDGER, id.as_bytes())? {
            self.delete(CF_LEDGER, &key)?;
        }
        self.delete(CF_ACTIVE_SESSIONS, id.as_bytes())?;
        self.delete(CF_ACCOUNTS, id.as_bytes())?;
        Ok(true)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().map_err(backend)
    }
}
