use crate::domain::ids::{AccountId, SessionId};
use crate::error::{StorageError, StoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RowKey {
    Account(AccountId),
    Session(SessionId),
}

/// Exclusive row locks with bounded waits.
///
/// Each transaction is an owner; re-acquiring a row it already holds is a
/// no-op. Waiters give up with [`StorageError::LockTimeout`] once the timeout
/// elapses.
#[derive(Default)]
pub(crate) struct LockTable {
    owners: Mutex<HashMap<RowKey, u64>>,
    released: Condvar,
    next_owner: AtomicU64,
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Corrupt("lock table poisoned".to_string())
}

impl LockTable {
    pub(crate) fn new_owner(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `true` when the lock was newly taken by `owner`.
    pub(crate) fn acquire(&self, key: RowKey, owner: u64, timeout: Duration) -> StoreResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut owners = self.owners.lock().map_err(poisoned)?;
        loop {
            match owners.get(&key) {
                None => {
                    owners.insert(key, owner);
                    return Ok(true);
                }
                Some(holder) if *holder == owner => return Ok(false),
                Some(_) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(StorageError::LockTimeout);
            }
            let (guard, _) = self
                .released
                .wait_timeout(owners, deadline - now)
                .map_err(poisoned)?;
            owners = guard;
        }
    }

    pub(crate) fn release(&self, owner: u64, keys: &[RowKey]) {
        if keys.is_empty() {
            return;
        }
        // Release even if another holder panicked; the map itself is intact.
        let mut owners = match self.owners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in keys {
            if owners.get(key) == Some(&owner) {
                owners.remove(key);
            }
        }
        drop(owners);
        self.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reentrant_acquire() {
        let table = LockTable::default();
        let owner = table.new_owner();
        let key = RowKey::Account(AccountId::generate());
        assert!(table.acquire(key, owner, Duration::from_millis(10)).unwrap());
        assert!(!table.acquire(key, owner, Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let table = LockTable::default();
        let key = RowKey::Session(SessionId::generate());
        let first = table.new_owner();
        let second = table.new_owner();
        table.acquire(key, first, Duration::from_millis(10)).unwrap();

        let result = table.acquire(key, second, Duration::from_millis(20));
        assert!(matches!(result, Err(StorageError::LockTimeout)));
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let table = Arc::new(LockTable::default());
        let key = RowKey::Account(AccountId::generate());
        let holder = table.new_owner();
        table.acquire(key, holder, Duration::from_millis(10)).unwrap();

        let waiter_table = Arc::clone(&table);
        let waiter = thread::spawn(move || {
            let owner = waiter_table.new_owner();
            waiter_table.acquire(key, owner, Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(20));
        table.release(holder, &[key]);
        assert!(waiter.join().unwrap().unwrap());
    }
}
