//! Domain model of the bankroll ledger.
//!
//! Entities (`Account`, `Session`, `LedgerEntry`) carry their own state
//! transitions; `ports` describes the transactional storage they live in.

pub mod account;
pub mod ids;
pub mod ledger;
pub mod ports;
pub mod session;
