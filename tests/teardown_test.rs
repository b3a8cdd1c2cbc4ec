mod common;

use casino_ledger::application::gateway::{SettlementGateway, TrustedGateway};
use casino_ledger::application::lifecycle::SessionManager;
use casino_ledger::application::teardown::teardown_account;
use casino_ledger::domain::account::{Account, Cents};
use casino_ledger::domain::ids::{AccountId, SessionId};
use casino_ledger::domain::ledger::{EntryType, LedgerEntry};
use casino_ledger::domain::ports::{LedgerStore, LedgerTx};
use casino_ledger::domain::session::{GameKind, Outcome, Session, SessionStatus};
use casino_ledger::error::{LedgerError, StorageError, StoreResult};
use casino_ledger::infrastructure::in_memory::InMemoryLedgerStore;
use common::{ENGINE_KEY, funded_account, high_roller_config, manager};
use std::sync::Arc;

/// In-memory store whose account deletions always fail.
struct UndeletableStore {
    inner: InMemoryLedgerStore,
}

struct UndeletableTx<'a> {
    inner: Box<dyn LedgerTx + 'a>,
}

impl LedgerStore for UndeletableStore {
    fn begin(&self) -> StoreResult<Box<dyn LedgerTx + '_>> {
        Ok(Box::new(UndeletableTx {
            inner: self.inner.begin()?,
        }))
    }

    fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.account(id)
    }

    fn session(&self, id: SessionId) -> StoreResult<Option<Session>> {
        self.inner.session(id)
    }

    fn active_session(&self, account_id: AccountId) -> StoreResult<Option<Session>> {
        self.inner.active_session(account_id)
    }

    fn sessions(&self, account_id: AccountId) -> StoreResult<Vec<Session>> {
        self.inner.sessions(account_id)
    }

    fn entries(&self, account_id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.entries(account_id)
    }
}

impl LedgerTx for UndeletableTx<'_> {
    fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        self.inner.lock_account(id)
    }

    fn lock_session(&mut self, id: SessionId) -> StoreResult<Option<Session>> {
        self.inner.lock_session(id)
    }

    fn active_session(&mut self, account_id: AccountId) -> StoreResult<Option<Session>> {
        self.inner.active_session(account_id)
    }

    fn insert_account(&mut self, account: &Account) -> StoreResult<()> {
        self.inner.insert_account(account)
    }

    fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        self.inner.update_account(account)
    }

    fn insert_session(&mut self, session: &Session) -> StoreResult<()> {
        self.inner.insert_session(session)
    }

    fn update_session(&mut self, session: &Session) -> StoreResult<()> {
        self.inner.update_session(session)
    }

    fn append_entry(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        self.inner.append_entry(entry)
    }

    fn delete_account(&mut self, _id: AccountId) -> StoreResult<bool> {
        Err(StorageError::Backend(Box::new(std::io::Error::other(
            "disk full",
        ))))
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit()
    }
}

#[tokio::test]
async fn test_teardown_leaves_no_residual_rows() {
    let (store, manager) = manager(high_roller_config(3_000));
    let gateway = TrustedGateway::from_config(manager.clone());
    let account = funded_account(&manager).await;
    let bystander = funded_account(&manager).await;

    let mut sessions = Vec::new();
    for (bet, payout) in [(1_000, 500), (2_500, 0)] {
        let opened = manager
            .open_session(account, GameKind::Blackjack, bet)
            .await
            .unwrap();
        sessions.push(opened.session_id);
        let settled = gateway
            .complete_session(ENGINE_KEY, opened.session_id, Outcome::Lose, payout)
            .await
            .unwrap();
        assert_eq!(settled.account_deleted, settled.balance_cents == Cents::ZERO);
    }
    manager
        .open_session(bystander, GameKind::Blackjack, 100)
        .await
        .unwrap();

    assert!(store.account(account).unwrap().is_none());
    assert!(store.active_session(account).unwrap().is_none());
    assert!(store.sessions(account).unwrap().is_empty());
    assert!(store.entries(account).unwrap().is_empty());
    for session in sessions {
        assert!(store.session(session).unwrap().is_none());
    }

    assert!(store.account(bystander).unwrap().is_some());
    assert_eq!(store.entries(bystander).unwrap().len(), 1);
    assert!(store.active_session(bystander).unwrap().is_some());
}

#[tokio::test]
async fn test_deleted_account_rejects_everything() {
    let (_, manager) = manager(high_roller_config(500));
    let gateway = TrustedGateway::from_config(manager.clone());
    let account = funded_account(&manager).await;
    let opened = manager
        .open_session(account, GameKind::Blackjack, 500)
        .await
        .unwrap();
    gateway
        .complete_session(ENGINE_KEY, opened.session_id, Outcome::Lose, 0)
        .await
        .unwrap();

    assert!(matches!(
        manager.open_session(account, GameKind::Blackjack, 1).await,
        Err(LedgerError::NotFound)
    ));
    assert!(matches!(
        manager
            .grant_credit(account, EntryType::Adjustment, 100, "too late")
            .await,
        Err(LedgerError::NotFound)
    ));
    assert!(matches!(
        manager.entries(account).await,
        Err(LedgerError::NotFound)
    ));
    assert!(matches!(
        gateway.get_session(ENGINE_KEY, opened.session_id).await,
        Err(LedgerError::NotFound)
    ));
}

#[tokio::test]
async fn test_credit_before_teardown_spares_account() {
    let (store, manager) = manager(high_roller_config(500));
    let account = funded_account(&manager).await;
    manager
        .open_session(account, GameKind::Blackjack, 500)
        .await
        .unwrap();
    manager
        .grant_credit(account, EntryType::Refund, 200, "dealer error")
        .await
        .unwrap();

    let abandoned = manager.abandon_session(account).await.unwrap();
    assert_eq!(abandoned.balance_cents, Cents(200));
    assert!(!abandoned.account_deleted);
    assert!(!teardown_account(store.as_ref(), account).unwrap());
    assert!(store.account(account).unwrap().is_some());
}

#[tokio::test]
async fn test_failed_teardown_keeps_settlement() {
    let store = Arc::new(UndeletableStore {
        inner: InMemoryLedgerStore::new(),
    });
    let manager = SessionManager::new(store, high_roller_config(1_000));
    let account = funded_account(&manager).await;
    let opened = manager
        .open_session(account, GameKind::Blackjack, 1_000)
        .await
        .unwrap();

    let settled = manager
        .settle_session(opened.session_id, Outcome::Lose, 0)
        .await
        .unwrap();
    assert_eq!(settled.balance_cents, Cents::ZERO);
    assert!(!settled.account_deleted);

    let session = manager.session(opened.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.result, Some(Outcome::Lose));

    let entries = manager.entries(account).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].entry_type, EntryType::Win);
    assert_eq!(entries[1].amount_cents, Cents::ZERO);
    assert_eq!(entries[1].session_id, Some(opened.session_id));
    assert_eq!(
        manager.account(account).await.unwrap().balance_cents,
        Cents::ZERO
    );

    // The failed teardown released its lock.
    let abandoned = manager.abandon_session(account).await;
    assert!(matches!(abandoned, Err(LedgerError::NoActiveSession)));
}
