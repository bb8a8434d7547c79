use crate::error::{LedgerError, Result};
use crate::types::{AccountId, AccountRecord, Credits, TransferRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type AccountMap = HashMap<AccountId, AccountRecord>;
// Scoped snapshot for rollback: `None` marks a row that did not exist yet.
type TransactionBackup = Option<HashMap<AccountId, Option<AccountRecord>>>;

/// Storage abstraction for account rows and the transfer history.
///
/// Every mutating method is an atomic conditional update: the check and
/// the write happen under one serialization point inside the store, so a
/// caller never reads a balance, computes, and writes back across two
/// round-trips. Multi-row operations bracket their writes with
/// `begin_transaction`/`commit_transaction` and roll back on failure;
/// callers are expected to serialize multi-row transactions among
/// themselves (the `AccountLedger` holds a guard for this).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn account(&self, id: AccountId) -> Result<AccountRecord>;
    async fn all_accounts(&self) -> Result<Vec<AccountRecord>>;

    /// Unconditionally add to `balance`.
    async fn credit(&self, id: AccountId, amount: Credits) -> Result<AccountRecord>;

    /// Add to `balance` and `total_earnings` together (payout credit).
    async fn credit_earnings(&self, id: AccountId, amount: Credits) -> Result<AccountRecord>;

    /// Subtract from `balance`, failing with `InsufficientBalance` inside
    /// the critical section if the balance does not cover the amount.
    async fn debit_if_sufficient(&self, id: AccountId, amount: Credits) -> Result<AccountRecord>;

    /// Move funds from `balance` to `assigned_balance` if covered.
    async fn reserve_if_sufficient(&self, id: AccountId, amount: Credits)
        -> Result<AccountRecord>;

    /// Move funds from `assigned_balance` back to `balance`.
    async fn release_assigned(&self, id: AccountId, amount: Credits) -> Result<AccountRecord>;

    /// Consume escrow directly from `assigned_balance` (payout debit).
    async fn debit_assigned(&self, id: AccountId, amount: Credits) -> Result<AccountRecord>;

    /// Adjust the claim counters; decrements saturate at zero.
    async fn update_counters(
        &self,
        id: AccountId,
        in_progress_delta: i32,
        completed_delta: i32,
    ) -> Result<AccountRecord>;

    async fn set_disabled(&self, id: AccountId, disabled: bool) -> Result<AccountRecord>;

    /// Snapshot the given rows so a failed multi-row operation can be
    /// rolled back without touching unrelated accounts.
    async fn begin_transaction(&self, scope: &[AccountId]) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    async fn record_transfer(&self, record: TransferRecord) -> Result<()>;
    async fn transfer_history(&self, id: AccountId) -> Result<Vec<TransferRecord>>;

    /// Paginated transfer history, newest first.
    /// Cursor format: "timestamp_micros:transfer_hash".
    async fn transfer_history_paginated(
        &self,
        id: AccountId,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<(Vec<TransferRecord>, Option<String>)>;
}

/// In-memory reference implementation.
pub struct MemoryLedgerStore {
    accounts: Arc<RwLock<AccountMap>>,
    backup: Arc<RwLock<TransactionBackup>>,
    transfers: Arc<RwLock<Vec<TransferRecord>>>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            backup: Arc::new(RwLock::new(None)),
            transfers: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn account(&self, id: AccountId) -> Result<AccountRecord> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .get(&id)
            .cloned()
            .unwrap_or_else(|| AccountRecord::new(id)))
    }

    async fn all_accounts(&self) -> Result<Vec<AccountRecord>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn credit(&self, id: AccountId, amount: Credits) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        record.balance = record
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(id))?;

        debug!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            storage_type = "memory",
            "Balance credited"
        );
        Ok(record.clone())
    }

    async fn credit_earnings(&self, id: AccountId, amount: Credits) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        let new_balance = record
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(id))?;
        let new_earnings = record
            .total_earnings
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(id))?;

        record.balance = new_balance;
        record.total_earnings = new_earnings;

        debug!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            total_earnings = %record.total_earnings,
            storage_type = "memory",
            "Earnings credited"
        );
        Ok(record.clone())
    }

    async fn debit_if_sufficient(&self, id: AccountId, amount: Credits) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        record.balance =
            record
                .balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientBalance {
                    needed: amount,
                    available: record.balance,
                })?;

        debug!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            storage_type = "memory",
            "Balance debited"
        );
        Ok(record.clone())
    }

    async fn reserve_if_sufficient(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        let new_balance =
            record
                .balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientBalance {
                    needed: amount,
                    available: record.balance,
                })?;
        let new_assigned = record
            .assigned_balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(id))?;

        record.balance = new_balance;
        record.assigned_balance = new_assigned;

        debug!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            assigned_after = %record.assigned_balance,
            storage_type = "memory",
            "Escrow reserved"
        );
        Ok(record.clone())
    }

    async fn release_assigned(&self, id: AccountId, amount: Credits) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        let new_assigned = record.assigned_balance.checked_sub(amount).ok_or(
            LedgerError::InsufficientAssigned {
                needed: amount,
                available: record.assigned_balance,
            },
        )?;
        let new_balance = record
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(id))?;

        record.assigned_balance = new_assigned;
        record.balance = new_balance;

        debug!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            assigned_after = %record.assigned_balance,
            storage_type = "memory",
            "Escrow released"
        );
        Ok(record.clone())
    }

    async fn debit_assigned(&self, id: AccountId, amount: Credits) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        record.assigned_balance = record.assigned_balance.checked_sub(amount).ok_or(
            LedgerError::InsufficientAssigned {
                needed: amount,
                available: record.assigned_balance,
            },
        )?;

        debug!(
            account = %id,
            amount = %amount,
            assigned_after = %record.assigned_balance,
            storage_type = "memory",
            "Escrow consumed"
        );
        Ok(record.clone())
    }

    async fn update_counters(
        &self,
        id: AccountId,
        in_progress_delta: i32,
        completed_delta: i32,
    ) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));

        record.in_progress_count =
            (record.in_progress_count as i64 + in_progress_delta as i64).max(0) as u32;
        record.completed_count =
            (record.completed_count as i64 + completed_delta as i64).max(0) as u32;

        Ok(record.clone())
    }

    async fn set_disabled(&self, id: AccountId, disabled: bool) -> Result<AccountRecord> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(id).or_insert_with(|| AccountRecord::new(id));
        record.disabled = disabled;
        Ok(record.clone())
    }

    async fn begin_transaction(&self, scope: &[AccountId]) -> Result<()> {
        let snapshot: HashMap<AccountId, Option<AccountRecord>> = {
            let accounts = self.accounts.read().await;
            scope
                .iter()
                .map(|id| (*id, accounts.get(id).cloned()))
                .collect()
        };

        let mut backup = self.backup.write().await;
        if backup.is_some() {
            return Err(LedgerError::Storage(
                "transaction already in progress".to_string(),
            ));
        }
        *backup = Some(snapshot);

        debug!(
            rows = scope.len(),
            storage_type = "memory",
            "Transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;
        *backup = None;
        debug!(
            storage_type = "memory",
            "Transaction committed (snapshot discarded)"
        );
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;

        if let Some(snapshot) = backup.take() {
            let mut accounts = self.accounts.write().await;
            for (id, row) in snapshot {
                match row {
                    Some(record) => {
                        accounts.insert(id, record);
                    }
                    None => {
                        accounts.remove(&id);
                    }
                }
            }
            debug!(
                storage_type = "memory",
                "Transaction rolled back (snapshot restored)"
            );
        }
        Ok(())
    }

    async fn record_transfer(&self, record: TransferRecord) -> Result<()> {
        let mut transfers = self.transfers.write().await;
        debug!(
            from = %record.from,
            to = %record.to,
            amount = %record.amount,
            reason = %record.reason,
            transfer_hash = %record.transfer_hash,
            storage_type = "memory",
            "Transfer recorded"
        );
        transfers.push(record);
        Ok(())
    }

    async fn transfer_history(&self, id: AccountId) -> Result<Vec<TransferRecord>> {
        let transfers = self.transfers.read().await;
        Ok(transfers
            .iter()
            .filter(|t| t.from == id || t.to == id)
            .cloned()
            .collect())
    }

    async fn transfer_history_paginated(
        &self,
        id: AccountId,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<(Vec<TransferRecord>, Option<String>)> {
        let transfers = self.transfers.read().await;

        let mut filtered: Vec<TransferRecord> = transfers
            .iter()
            .filter(|t| t.from == id || t.to == id)
            .cloned()
            .collect();
        // Newest first; the hash breaks ties for a stable cursor.
        filtered.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.transfer_hash.cmp(&a.transfer_hash))
        });

        let start = match cursor {
            Some(cursor) => {
                let (ts, hash) = cursor
                    .split_once(':')
                    .ok_or_else(|| LedgerError::Storage(format!("bad cursor: {}", cursor)))?;
                let ts: i64 = ts
                    .parse()
                    .map_err(|_| LedgerError::Storage(format!("bad cursor: {}", cursor)))?;
                filtered
                    .iter()
                    .position(|t| t.timestamp.timestamp_micros() == ts && t.transfer_hash == hash)
                    .map(|pos| pos + 1)
                    .unwrap_or(filtered.len())
            }
            None => 0,
        };

        let page: Vec<TransferRecord> = filtered.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + page.len() < filtered.len() {
            page.last().map(|t| {
                format!("{}:{}", t.timestamp.timestamp_micros(), t.transfer_hash)
            })
        } else {
            None
        };

        Ok((page, next_cursor))
    }
}
