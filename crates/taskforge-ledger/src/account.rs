use crate::error::{LedgerError, Result};
use crate::storage::LedgerStore;
use crate::types::{AccountId, AccountRecord, Credits, TransferReason, TransferRecord};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Outcome of one payout split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub unit_price: Credits,
    pub worker_share: Credits,
    pub platform_fee: Credits,
}

/// Per-account monetary ledger.
///
/// Wraps a [`LedgerStore`] and adds policy (disabled accounts, amount
/// validation), transfer-history records, and structured logging. Single
/// row mutations are atomic inside the store; the multi-row payout is
/// bracketed by a store transaction and serialized by `tx_guard` so a
/// rollback can never clobber a concurrent payout.
pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
    tx_guard: Mutex<()>,
}

impl AccountLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            tx_guard: Mutex::new(()),
        }
    }

    pub async fn account(&self, id: AccountId) -> Result<AccountRecord> {
        self.store.account(id).await
    }

    pub async fn balance(&self, id: AccountId) -> Result<Credits> {
        Ok(self.store.account(id).await?.balance)
    }

    pub async fn assigned_balance(&self, id: AccountId) -> Result<Credits> {
        Ok(self.store.account(id).await?.assigned_balance)
    }

    pub async fn total_earnings(&self, id: AccountId) -> Result<Credits> {
        Ok(self.store.account(id).await?.total_earnings)
    }

    pub async fn credit(
        &self,
        id: AccountId,
        amount: Credits,
        reason: TransferReason,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let record = self.store.credit(id, amount).await?;
        self.record_transfer(id, id, amount, reason).await;

        info!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            reason = %reason,
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn debit(&self, id: AccountId, amount: Credits, reason: TransferReason) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let record = self.store.debit_if_sufficient(id, amount).await?;
        self.record_transfer(id, id, amount, reason).await;

        info!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            reason = %reason,
            "💸 Balance debited"
        );
        Ok(())
    }

    /// Move `amount` from spendable balance into escrow.
    ///
    /// Refused for disabled accounts: a soft-disabled provider keeps its
    /// history and can still be paid, but cannot take on new obligations.
    pub async fn reserve(&self, id: AccountId, amount: Credits) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if self.store.account(id).await?.disabled {
            return Err(LedgerError::AccountDisabled(id));
        }

        let record = self.store.reserve_if_sufficient(id, amount).await?;
        self.record_transfer(id, id, amount, TransferReason::EscrowReserve)
            .await;

        info!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            assigned_after = %record.assigned_balance,
            "🔒 Escrow reserved"
        );
        Ok(())
    }

    /// Move `amount` from escrow back into spendable balance.
    pub async fn release(&self, id: AccountId, amount: Credits) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let record = self.store.release_assigned(id, amount).await?;
        self.record_transfer(id, id, amount, TransferReason::EscrowRelease)
            .await;

        info!(
            account = %id,
            amount = %amount,
            balance_after = %record.balance,
            assigned_after = %record.assigned_balance,
            "🔓 Escrow released"
        );
        Ok(())
    }

    /// Settle one approved claim: consume `unit_price` from the owner's
    /// escrow, credit the worker their share plus earnings, credit the
    /// platform treasury the remainder, and move the worker's claim
    /// counters. All writes commit together or not at all.
    pub async fn payout_split(
        &self,
        owner: AccountId,
        worker: AccountId,
        unit_price: Credits,
        payout_rate_bps: u16,
    ) -> Result<PayoutBreakdown> {
        let worker_share = unit_price.mul_bps(payout_rate_bps);
        let platform_fee = unit_price.saturating_sub(worker_share);
        let treasury = AccountId::platform_treasury();

        let _guard = self.tx_guard.lock().await;
        self.store
            .begin_transaction(&[owner, worker, treasury])
            .await?;

        let result = async {
            self.store.debit_assigned(owner, unit_price).await?;
            self.store.credit_earnings(worker, worker_share).await?;
            if !platform_fee.is_zero() {
                self.store.credit(treasury, platform_fee).await?;
            }
            self.store.update_counters(worker, -1, 1).await?;
            Ok::<(), LedgerError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.store.commit_transaction().await?;

                self.record_transfer(owner, worker, worker_share, TransferReason::PayoutEarnings)
                    .await;
                if !platform_fee.is_zero() {
                    self.record_transfer(owner, treasury, platform_fee, TransferReason::PlatformFee)
                        .await;
                }

                info!(
                    owner = %owner,
                    worker = %worker,
                    unit_price = %unit_price,
                    worker_share = %worker_share,
                    platform_fee = %platform_fee,
                    "✅ Payout committed"
                );
                Ok(PayoutBreakdown {
                    unit_price,
                    worker_share,
                    platform_fee,
                })
            }
            Err(e) => {
                info!(
                    owner = %owner,
                    worker = %worker,
                    unit_price = %unit_price,
                    error = %e,
                    "❌ Payout rolled back"
                );
                self.store.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    /// A worker took on a claim.
    pub async fn claim_started(&self, worker: AccountId) -> Result<()> {
        self.store.update_counters(worker, 1, 0).await?;
        Ok(())
    }

    /// A worker's claim ended without completion (rejection).
    pub async fn claim_abandoned(&self, worker: AccountId) -> Result<()> {
        self.store.update_counters(worker, -1, 0).await?;
        Ok(())
    }

    pub async fn set_disabled(&self, id: AccountId, disabled: bool) -> Result<()> {
        let record = self.store.set_disabled(id, disabled).await?;
        info!(
            account = %id,
            disabled = record.disabled,
            "Account disabled flag updated"
        );
        Ok(())
    }

    pub async fn is_disabled(&self, id: AccountId) -> Result<bool> {
        Ok(self.store.account(id).await?.disabled)
    }

    pub async fn all_accounts(&self) -> Result<Vec<AccountRecord>> {
        self.store.all_accounts().await
    }

    pub async fn transfer_history(&self, id: AccountId) -> Result<Vec<TransferRecord>> {
        self.store.transfer_history(id).await
    }

    pub async fn transfer_history_paginated(
        &self,
        id: AccountId,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<(Vec<TransferRecord>, Option<String>)> {
        self.store.transfer_history_paginated(id, limit, cursor).await
    }

    // History is advisory; a failed append must not fail the movement it
    // describes.
    async fn record_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Credits,
        reason: TransferReason,
    ) {
        let record = TransferRecord::new(from, to, amount, reason);
        if let Err(e) = self.store.record_transfer(record).await {
            debug!(from = %from, to = %to, error = %e, "Failed to record transfer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLedgerStore;

    fn ledger() -> AccountLedger {
        AccountLedger::new(Arc::new(MemoryLedgerStore::new()))
    }

    #[tokio::test]
    async fn test_credit_debit_roundtrip() {
        let ledger = ledger();
        let id = AccountId::from_bytes([1; 32]);

        ledger
            .credit(id, Credits::from_credits(100.0), TransferReason::DepositApproved)
            .await
            .unwrap();
        ledger
            .debit(id, Credits::from_credits(30.0), TransferReason::WithdrawalHold)
            .await
            .unwrap();

        assert_eq!(ledger.balance(id).await.unwrap(), Credits::from_credits(70.0));

        let err = ledger
            .debit(id, Credits::from_credits(80.0), TransferReason::WithdrawalHold)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(id).await.unwrap(), Credits::from_credits(70.0));
    }

    #[tokio::test]
    async fn test_reserve_moves_funds_out_of_balance() {
        let ledger = ledger();
        let id = AccountId::from_bytes([2; 32]);

        ledger
            .credit(id, Credits::from_credits(100.0), TransferReason::DepositApproved)
            .await
            .unwrap();
        ledger.reserve(id, Credits::from_credits(50.0)).await.unwrap();

        assert_eq!(ledger.balance(id).await.unwrap(), Credits::from_credits(50.0));
        assert_eq!(
            ledger.assigned_balance(id).await.unwrap(),
            Credits::from_credits(50.0)
        );

        ledger.release(id, Credits::from_credits(30.0)).await.unwrap();
        assert_eq!(ledger.balance(id).await.unwrap(), Credits::from_credits(80.0));
        assert_eq!(
            ledger.assigned_balance(id).await.unwrap(),
            Credits::from_credits(20.0)
        );
    }

    #[tokio::test]
    async fn test_disabled_account_refuses_reserve() {
        let ledger = ledger();
        let id = AccountId::from_bytes([3; 32]);

        ledger
            .credit(id, Credits::from_credits(10.0), TransferReason::DepositApproved)
            .await
            .unwrap();
        ledger.set_disabled(id, true).await.unwrap();

        let err = ledger.reserve(id, Credits::from_credits(5.0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountDisabled(_)));

        // Credits still land; history is retained.
        ledger
            .credit(id, Credits::from_credits(1.0), TransferReason::DepositApproved)
            .await
            .unwrap();
        assert_eq!(ledger.balance(id).await.unwrap(), Credits::from_credits(11.0));
    }

    #[tokio::test]
    async fn test_payout_split_conserves_funds() {
        let ledger = ledger();
        let owner = AccountId::from_bytes([4; 32]);
        let worker = AccountId::from_bytes([5; 32]);
        let treasury = AccountId::platform_treasury();

        ledger
            .credit(owner, Credits::from_credits(100.0), TransferReason::DepositApproved)
            .await
            .unwrap();
        ledger.reserve(owner, Credits::from_credits(10.0)).await.unwrap();
        ledger.claim_started(worker).await.unwrap();

        let breakdown = ledger
            .payout_split(owner, worker, Credits::from_credits(10.0), 9_000)
            .await
            .unwrap();

        assert_eq!(breakdown.worker_share, Credits::from_credits(9.0));
        assert_eq!(breakdown.platform_fee, Credits::from_credits(1.0));

        assert_eq!(ledger.assigned_balance(owner).await.unwrap(), Credits::ZERO);
        assert_eq!(ledger.balance(worker).await.unwrap(), Credits::from_credits(9.0));
        assert_eq!(
            ledger.total_earnings(worker).await.unwrap(),
            Credits::from_credits(9.0)
        );
        assert_eq!(ledger.balance(treasury).await.unwrap(), Credits::from_credits(1.0));

        let worker_record = ledger.account(worker).await.unwrap();
        assert_eq!(worker_record.in_progress_count, 0);
        assert_eq!(worker_record.completed_count, 1);
    }

    #[tokio::test]
    async fn test_payout_split_fails_without_escrow() {
        let ledger = ledger();
        let owner = AccountId::from_bytes([6; 32]);
        let worker = AccountId::from_bytes([7; 32]);

        ledger
            .credit(owner, Credits::from_credits(100.0), TransferReason::DepositApproved)
            .await
            .unwrap();

        // Nothing reserved: the payout must fail and leave no trace.
        let err = ledger
            .payout_split(owner, worker, Credits::from_credits(10.0), 9_000)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAssigned { .. }));

        assert_eq!(ledger.balance(owner).await.unwrap(), Credits::from_credits(100.0));
        assert_eq!(ledger.balance(worker).await.unwrap(), Credits::ZERO);
        assert_eq!(ledger.total_earnings(worker).await.unwrap(), Credits::ZERO);
    }
}
