use super::guard::AccountGuard;
use super::teardown::{is_bust, teardown_account};
use crate::config::{GameConfig, LedgerConfig};
use crate::domain::account::{Account, Amount, Cents};
use crate::domain::ids::{AccountId, SessionId};
use crate::domain::ledger::{EntryType, LedgerEntry};
use crate::domain::ports::{LedgerStore, LedgerStoreRef};
use crate::domain::session::{GameKind, Outcome, Session};
use crate::error::{Constraint, LedgerError, Result, StorageError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedSession {
    pub session_id: SessionId,
    pub balance_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub session_id: SessionId,
    pub balance_cents: Cents,
    pub account_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abandonment {
    pub session_id: SessionId,
    pub balance_cents: Cents,
    pub account_deleted: bool,
}

/// Opens, settles and abandons sessions.
///
/// Every mutating call runs as exactly one storage transaction on the
/// blocking pool. Nothing is cached between calls: balances and session
/// status are always re-read under lock.
#[derive(Clone)]
pub struct SessionManager {
    store: LedgerStoreRef,
    config: Arc<LedgerConfig>,
}

/// Both the pre-check and the structural constraint report a second active
/// session the same way.
fn active_conflict(err: StorageError) -> LedgerError {
    match err {
        StorageError::Constraint(Constraint::ActiveSessionExists) => {
            LedgerError::SessionAlreadyActive
        }
        other => LedgerError::Storage(other),
    }
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// Clones are cheap and share both the store and the configuration, so a
    /// single manager can be handed to every request-handling task.
    ///
    /// # Arguments
    ///
    /// * `store` - The transactional backend holding accounts, sessions and
    ///   ledger entries.
    /// * `config` - Starting balance, game catalogue and the gateway secret.
    pub fn new(store: LedgerStoreRef, config: LedgerConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The configured game catalogue.
    pub fn games(&self) -> &[GameConfig] {
        &self.config.games
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LedgerStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|e| LedgerError::Storage(StorageError::Backend(Box::new(e))))?
    }

    /// Creates an account funded with the configured starting balance.
    pub async fn register_account(&self) -> Result<Account> {
        let account = Account::open(self.config.starting_balance());
        self.blocking(move |store| {
            let mut tx = store.begin()?;
            tx.insert_account(&account)?;
            tx.commit()?;
            info!(account = %account.id, balance = %account.balance_cents, "account registered");
            Ok(account)
        })
        .await
    }

    /// Places a bet: debits the account and records the new session together
    /// with its `bet` ledger entry, atomically.
    pub async fn open_session(
        &self,
        account_id: AccountId,
        game: GameKind,
        bet_cents: i64,
    ) -> Result<OpenedSession> {
        let bet = self
            .config
            .game(game)
            .ok_or(LedgerError::UnknownGame)?
            .check_bet(bet_cents)?;

        self.blocking(move |store| {
            let mut tx = store.begin()?;
            if tx.active_session(account_id)?.is_some() {
                return Err(LedgerError::SessionAlreadyActive);
            }
            let change = AccountGuard::lock(&mut *tx, account_id)?.debit(bet)?;

            let session = Session::open(account_id, game, bet);
            tx.insert_session(&session).map_err(active_conflict)?;
            tx.append_entry(&LedgerEntry::record(
                account_id,
                Some(session.id),
                EntryType::Bet,
                change,
                format!("Bet placed on {game}"),
            ))?;
            tx.commit().map_err(active_conflict)?;

            info!(
                account = %account_id,
                session = %session.id,
                %game,
                bet = %bet.cents(),
                "session opened"
            );
            Ok(OpenedSession {
                session_id: session.id,
                balance_cents: change.after,
            })
        })
        .await
    }

    /// Records the final result of an active session and credits the payout.
    ///
    /// Not idempotent: a second call for the same session fails with
    /// `SessionNotActive` and moves no money. If the resulting balance is zero
    /// the account is torn down after the settlement has committed; a failed
    /// teardown is logged and never undoes the settlement.
    pub async fn settle_session(
        &self,
        session_id: SessionId,
        result: Outcome,
        payout_cents: i64,
    ) -> Result<Settlement> {
        let payout = Cents(payout_cents);
        self.blocking(move |store| {
            let mut tx = store.begin()?;
            let mut session = tx.lock_session(session_id)?.ok_or(LedgerError::NotFound)?;
            if let Err(e) = session.complete(result, payout) {
                if matches!(e, LedgerError::SessionNotActive) {
                    warn!(session = %session_id, status = ?session.status, "settlement rejected");
                }
                return Err(e);
            }
            let account_id = session.account_id;
            let change = AccountGuard::lock(&mut *tx, account_id)?.credit(payout)?;

            tx.update_session(&session)?;
            tx.append_entry(&LedgerEntry::record(
                account_id,
                Some(session_id),
                EntryType::Win,
                change,
                format!("Game completed: {result}"),
            ))?;
            tx.commit()?;
            info!(
                account = %account_id,
                session = %session_id,
                %result,
                payout = %payout,
                balance = %change.after,
                "session settled"
            );

            let account_deleted = is_bust(change.after) && teardown_or_log(store, account_id);
            Ok(Settlement {
                session_id,
                balance_cents: change.after,
                account_deleted,
            })
        })
        .await
    }

    /// Forfeits the caller's active session. The bet debited at open time
    /// stands and no further ledger entry is written.
    pub async fn abandon_session(&self, account_id: AccountId) -> Result<Abandonment> {
        self.blocking(move |store| {
            let mut tx = store.begin()?;
            let Some(active) = tx.active_session(account_id)? else {
                return match store.account(account_id)? {
                    Some(_) => Err(LedgerError::NoActiveSession),
                    None => Err(LedgerError::NotFound),
                };
            };

            // Settlement may have won the race for the session row.
            let mut session = tx
                .lock_session(active.id)?
                .filter(|s| s.is_active())
                .ok_or(LedgerError::NoActiveSession)?;
            let balance = AccountGuard::lock(&mut *tx, account_id)?.balance();

            session.abandon()?;
            tx.update_session(&session)?;
            tx.commit()?;
            info!(account = %account_id, session = %session.id, "session abandoned");

            let account_deleted = is_bust(balance) && teardown_or_log(store, account_id);
            Ok(Abandonment {
                session_id: session.id,
                balance_cents: balance,
                account_deleted,
            })
        })
        .await
    }

    /// Credits money outside of any session (bonuses, refunds, manual
    /// adjustments). The ledger entry carries no session id.
    pub async fn grant_credit(
        &self,
        account_id: AccountId,
        entry_type: EntryType,
        amount_cents: i64,
        description: impl Into<String>,
    ) -> Result<Cents> {
        if matches!(entry_type, EntryType::Bet | EntryType::Win) {
            return Err(LedgerError::InvalidAmount(format!(
                "{entry_type:?} entries are only written by sessions"
            )));
        }
        let amount = Amount::new(amount_cents)?;
        let description = description.into();
        self.blocking(move |store| {
            let mut tx = store.begin()?;
            let change = AccountGuard::lock(&mut *tx, account_id)?.credit(amount.cents())?;
            tx.append_entry(&LedgerEntry::record(
                account_id,
                None,
                entry_type,
                change,
                description,
            ))?;
            tx.commit()?;
            info!(account = %account_id, ?entry_type, amount = %amount.cents(), "credit granted");
            Ok(change.after)
        })
        .await
    }

    pub async fn account(&self, account_id: AccountId) -> Result<Account> {
        self.blocking(move |store| store.account(account_id)?.ok_or(LedgerError::NotFound))
            .await
    }

    /// The account's active session, if any. An unknown account is
    /// `NotFound`, not `None`.
    pub async fn active_session(&self, account_id: AccountId) -> Result<Option<Session>> {
        self.blocking(move |store| {
            if store.account(account_id)?.is_none() {
                return Err(LedgerError::NotFound);
            }
            Ok(store.active_session(account_id)?)
        })
        .await
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Session> {
        self.blocking(move |store| store.session(session_id)?.ok_or(LedgerError::NotFound))
            .await
    }

    pub async fn sessions(&self, account_id: AccountId) -> Result<Vec<Session>> {
        self.blocking(move |store| {
            if store.account(account_id)?.is_none() {
                return Err(LedgerError::NotFound);
            }
            Ok(store.sessions(account_id)?)
        })
        .await
    }

    pub async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>> {
        self.blocking(move |store| {
            if store.account(account_id)?.is_none() {
                return Err(LedgerError::NotFound);
            }
            Ok(store.entries(account_id)?)
        })
        .await
    }
}

fn teardown_or_log(store: &dyn LedgerStore, account_id: AccountId) -> bool {
    match teardown_account(store, account_id) {
        Ok(deleted) => deleted,
        Err(e) => {
            error!(account = %account_id, error = ?e, "teardown failed");
            false
        }
    }
}
