//! # TaskForge Ledger
//!
//! Monetary core of the TaskForge marketplace: per-account balances with
//! escrow (`assigned_balance`), the deposit/withdrawal transaction ledger
//! with administrator resolution, and the storage abstraction both sit on.
//!
//! Concurrency contract: every balance mutation is an atomic conditional
//! update inside the [`storage::LedgerStore`]; multi-row movements (the
//! payout split) run inside a store transaction and roll back on failure.

pub mod account;
pub mod error;
pub mod storage;
pub mod transactions;
pub mod types;

pub use account::{AccountLedger, PayoutBreakdown};
pub use error::{LedgerError, Result};
pub use storage::{LedgerStore, MemoryLedgerStore};
pub use transactions::{
    Decision, Transaction, TransactionKind, TransactionManager, TransactionStats,
    TransactionStatus,
};
pub use types::{AccountId, AccountRecord, Credits, TransferReason, TransferRecord};

use std::sync::Arc;

/// Assembled ledger: storage, account ledger, and transaction manager.
pub struct LedgerEngine {
    pub store: Arc<dyn LedgerStore>,
    pub accounts: Arc<AccountLedger>,
    pub transactions: Arc<TransactionManager>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let accounts = Arc::new(AccountLedger::new(store.clone()));
        let transactions = Arc::new(TransactionManager::new(accounts.clone()));
        Self {
            store,
            accounts,
            transactions,
        }
    }

    /// Engine backed by the in-memory reference store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerStore::new()))
    }
}
