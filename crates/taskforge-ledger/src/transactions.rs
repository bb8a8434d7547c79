use crate::account::AccountLedger;
use crate::error::{LedgerError, Result};
use crate::types::{AccountId, Credits, TransferReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use taskforge_app_common::LifecycleState;
use tokio::sync::RwLock;
use tracing::info;

/// Money-movement request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Funds arriving from an external payment rail. `external_ref` is the
    /// rail's reference and must be globally unique among approved
    /// deposits.
    Deposit { external_ref: String },
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
}

impl LifecycleState for TransactionStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

/// One deposit or withdrawal request and its resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub account: AccountId,
    pub amount: Credits,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<AccountId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct TransactionBook {
    transactions: HashMap<u64, Transaction>,
    next_id: u64,
    /// External references consumed by approved deposits; the replay guard.
    approved_refs: HashSet<String>,
}

/// Deposit/withdrawal ledger with administrator resolution.
///
/// Deposits credit only on approval; withdrawals debit up front
/// (optimistic hold) and are refunded on rejection. The asymmetry keeps a
/// user from spending funds twice while a deposit is still unverified.
pub struct TransactionManager {
    ledger: Arc<AccountLedger>,
    book: Arc<RwLock<TransactionBook>>,
    admins: Arc<RwLock<HashSet<AccountId>>>,
}

impl TransactionManager {
    pub fn new(ledger: Arc<AccountLedger>) -> Self {
        Self {
            ledger,
            book: Arc::new(RwLock::new(TransactionBook::default())),
            admins: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn add_admin(&self, admin: AccountId) {
        let mut admins = self.admins.write().await;
        admins.insert(admin);
        info!(admin = %admin, "Transaction admin registered");
    }

    pub async fn is_admin(&self, account: AccountId) -> bool {
        self.admins.read().await.contains(&account)
    }

    /// Record a deposit request. No balance effect until approval.
    pub async fn request_deposit(
        &self,
        account: AccountId,
        amount: Credits,
        external_ref: impl Into<String>,
    ) -> Result<u64> {
        let external_ref = external_ref.into();
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "deposit amount must be positive".to_string(),
            ));
        }
        if external_ref.trim().is_empty() {
            return Err(LedgerError::InvalidAmount(
                "deposit requires an external reference".to_string(),
            ));
        }

        let mut book = self.book.write().await;
        book.next_id += 1;
        let id = book.next_id;
        book.transactions.insert(
            id,
            Transaction {
                id,
                account,
                amount,
                kind: TransactionKind::Deposit { external_ref: external_ref.clone() },
                status: TransactionStatus::Pending,
                reason: None,
                requested_at: Utc::now(),
                resolved_at: None,
                resolved_by: None,
            },
        );

        info!(
            transaction_id = id,
            account = %account,
            amount = %amount,
            external_ref = %external_ref,
            "📥 Deposit requested"
        );
        Ok(id)
    }

    /// Record a withdrawal request and place the optimistic hold.
    ///
    /// The debit happens here, atomically; `InsufficientBalance` surfaces
    /// verbatim and nothing is recorded.
    pub async fn request_withdrawal(&self, account: AccountId, amount: Credits) -> Result<u64> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if self.ledger.is_disabled(account).await? {
            return Err(LedgerError::AccountDisabled(account));
        }

        let mut book = self.book.write().await;
        self.ledger
            .debit(account, amount, TransferReason::WithdrawalHold)
            .await?;

        book.next_id += 1;
        let id = book.next_id;
        book.transactions.insert(
            id,
            Transaction {
                id,
                account,
                amount,
                kind: TransactionKind::Withdrawal,
                status: TransactionStatus::Pending,
                reason: None,
                requested_at: Utc::now(),
                resolved_at: None,
                resolved_by: None,
            },
        );

        info!(
            transaction_id = id,
            account = %account,
            amount = %amount,
            "📤 Withdrawal requested (hold placed)"
        );
        Ok(id)
    }

    /// Resolve a pending transaction. Administrator-only, exactly once.
    pub async fn resolve(
        &self,
        transaction_id: u64,
        admin: AccountId,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<()> {
        if !self.is_admin(admin).await {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not a transaction administrator",
                admin
            )));
        }

        // The whole resolution runs inside the book's write guard so a
        // duplicate admin action or a retried request observes the final
        // status, never a half-applied one.
        let mut book = self.book.write().await;

        let tx = book
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

        if tx.status.is_terminal() {
            return Err(LedgerError::TransactionAlreadyResolved(transaction_id));
        }

        let new_status = match (&tx.kind, decision) {
            (TransactionKind::Deposit { external_ref }, Decision::Approve) => {
                if book.approved_refs.contains(external_ref) {
                    return Err(LedgerError::DuplicateReference(external_ref.clone()));
                }
                self.ledger
                    .credit(tx.account, tx.amount, TransferReason::DepositApproved)
                    .await?;
                book.approved_refs.insert(external_ref.clone());
                TransactionStatus::Approved
            }
            // Nothing was credited yet; rejection has no balance effect.
            (TransactionKind::Deposit { .. }, Decision::Reject) => TransactionStatus::Rejected,
            // Already debited at request time.
            (TransactionKind::Withdrawal, Decision::Approve) => TransactionStatus::Approved,
            (TransactionKind::Withdrawal, Decision::Reject) => {
                self.ledger
                    .credit(tx.account, tx.amount, TransferReason::WithdrawalRefund)
                    .await?;
                TransactionStatus::Rejected
            }
        };

        let entry = book
            .transactions
            .get_mut(&transaction_id)
            .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
        entry.status = new_status;
        entry.reason = reason;
        entry.resolved_at = Some(Utc::now());
        entry.resolved_by = Some(admin);

        info!(
            transaction_id,
            admin = %admin,
            status = ?new_status,
            account = %tx.account,
            amount = %tx.amount,
            "⚖️ Transaction resolved"
        );
        Ok(())
    }

    pub async fn transaction(&self, id: u64) -> Result<Transaction> {
        let book = self.book.read().await;
        book.transactions
            .get(&id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    pub async fn transactions_for(&self, account: AccountId) -> Vec<Transaction> {
        let book = self.book.read().await;
        let mut txs: Vec<Transaction> = book
            .transactions
            .values()
            .filter(|t| t.account == account)
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.id);
        txs
    }

    /// Admin work queue: every unresolved request, oldest first.
    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        let book = self.book.read().await;
        let mut txs: Vec<Transaction> = book
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending)
            .cloned()
            .collect();
        txs.sort_by_key(|t| t.id);
        txs
    }

    pub async fn get_stats(&self) -> TransactionStats {
        let book = self.book.read().await;
        let mut stats = TransactionStats {
            total: book.transactions.len() as u64,
            ..Default::default()
        };
        for tx in book.transactions.values() {
            match tx.status {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Approved => stats.approved += 1,
                TransactionStatus::Rejected => stats.rejected += 1,
            }
        }
        stats
    }
}
