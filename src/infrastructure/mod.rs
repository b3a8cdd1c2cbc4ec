//! Storage backends implementing the ledger ports.

pub mod in_memory;
mod locks;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
