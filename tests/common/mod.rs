#![allow(dead_code)]

use casino_ledger::application::lifecycle::SessionManager;
use casino_ledger::config::{GameConfig, LedgerConfig};
use casino_ledger::domain::ids::AccountId;
use casino_ledger::domain::session::GameKind;
use casino_ledger::infrastructure::in_memory::InMemoryLedgerStore;
use std::sync::Arc;

pub const ENGINE_KEY: &str = "test-engine-key";

/// Defaults, with a shared secret that is not the development key.
pub fn config() -> LedgerConfig {
    LedgerConfig {
        internal_api_key: ENGINE_KEY.to_string(),
        ..LedgerConfig::default()
    }
}

/// A single blackjack table whose limits accept any bet up to the bankroll.
pub fn high_roller_config(starting_balance_cents: i64) -> LedgerConfig {
    LedgerConfig {
        starting_balance_cents,
        games: vec![GameConfig {
            game: GameKind::Blackjack,
            name: "High Roller Blackjack".to_string(),
            min_bet_cents: 1,
            max_bet_cents: 1_000_000,
            enabled: true,
        }],
        ..config()
    }
}

pub fn manager(config: LedgerConfig) -> (Arc<InMemoryLedgerStore>, SessionManager) {
    let store = Arc::new(InMemoryLedgerStore::with_lock_timeout(
        config.lock_timeout(),
    ));
    let manager = SessionManager::new(store.clone(), config);
    (store, manager)
}

pub async fn funded_account(manager: &SessionManager) -> AccountId {
    manager.register_account().await.unwrap().id
}
