//! Fault-injection harness for the payout path: a failure between the
//! escrow debit and the worker credit must leave no partial effect.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use taskforge_ledger::{
    AccountId, AccountLedger, AccountRecord, Credits, LedgerError, LedgerStore,
    MemoryLedgerStore, TransferRecord, TransferReason,
};
use taskforge_market::{ClaimStatus, MarketConfig, MarketCoordinator, TaskSpec};

/// Decorator over the in-memory store that can be armed to fail the
/// worker-credit step of a payout, after the escrow debit already wrote.
struct FaultyStore {
    inner: MemoryLedgerStore,
    fail_credit_earnings: AtomicBool,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: MemoryLedgerStore::new(),
            fail_credit_earnings: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.fail_credit_earnings.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.fail_credit_earnings.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn account(&self, id: AccountId) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.account(id).await
    }

    async fn all_accounts(&self) -> taskforge_ledger::Result<Vec<AccountRecord>> {
        self.inner.all_accounts().await
    }

    async fn credit(&self, id: AccountId, amount: Credits) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.credit(id, amount).await
    }

    async fn credit_earnings(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> taskforge_ledger::Result<AccountRecord> {
        if self.fail_credit_earnings.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("injected fault: connection lost".to_string()));
        }
        self.inner.credit_earnings(id, amount).await
    }

    async fn debit_if_sufficient(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.debit_if_sufficient(id, amount).await
    }

    async fn reserve_if_sufficient(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.reserve_if_sufficient(id, amount).await
    }

    async fn release_assigned(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.release_assigned(id, amount).await
    }

    async fn debit_assigned(
        &self,
        id: AccountId,
        amount: Credits,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.debit_assigned(id, amount).await
    }

    async fn update_counters(
        &self,
        id: AccountId,
        in_progress_delta: i32,
        completed_delta: i32,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner
            .update_counters(id, in_progress_delta, completed_delta)
            .await
    }

    async fn set_disabled(
        &self,
        id: AccountId,
        disabled: bool,
    ) -> taskforge_ledger::Result<AccountRecord> {
        self.inner.set_disabled(id, disabled).await
    }

    async fn begin_transaction(&self, scope: &[AccountId]) -> taskforge_ledger::Result<()> {
        self.inner.begin_transaction(scope).await
    }

    async fn commit_transaction(&self) -> taskforge_ledger::Result<()> {
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&self) -> taskforge_ledger::Result<()> {
        self.inner.rollback_transaction().await
    }

    async fn record_transfer(&self, record: TransferRecord) -> taskforge_ledger::Result<()> {
        self.inner.record_transfer(record).await
    }

    async fn transfer_history(&self, id: AccountId) -> taskforge_ledger::Result<Vec<TransferRecord>> {
        self.inner.transfer_history(id).await
    }

    async fn transfer_history_paginated(
        &self,
        id: AccountId,
        limit: usize,
        cursor: Option<String>,
    ) -> taskforge_ledger::Result<(Vec<TransferRecord>, Option<String>)> {
        self.inner.transfer_history_paginated(id, limit, cursor).await
    }
}

#[tokio::test]
async fn test_payout_rolls_back_on_mid_transaction_failure() {
    let store = Arc::new(FaultyStore::new());
    let ledger = Arc::new(AccountLedger::new(store.clone()));
    let market = MarketCoordinator::new(MarketConfig::default(), ledger.clone());

    let owner = AccountId::from_bytes([1; 32]);
    let worker = AccountId::from_bytes([2; 32]);
    ledger
        .credit(owner, Credits::from_credits(100.0), TransferReason::DepositApproved)
        .await
        .unwrap();

    let task = market
        .create_task(
            owner,
            TaskSpec {
                title: "Atomicity probe".to_string(),
                description: "one slot".to_string(),
                unit_price: Credits::from_credits(10.0),
                slots: 1,
            },
        )
        .await
        .unwrap();
    market.publish_task(task.id, owner).await.unwrap();

    let claim = market.accept_slot(task.id, worker).await.unwrap();
    market
        .submit_proof(claim.id, worker, vec!["https://proofs/p".into()])
        .await
        .unwrap();

    let owner_before = ledger.account(owner).await.unwrap();
    let worker_before = ledger.account(worker).await.unwrap();

    // Fail between the escrow debit and the worker credit.
    store.arm();
    let err = market.verify_proof(claim.id, owner, true).await.unwrap_err();
    assert!(matches!(
        err,
        taskforge_market::MarketError::Ledger(LedgerError::Storage(_))
    ));

    // No partial effect anywhere: the debit that already happened was
    // rolled back, nothing was credited, the claim is still in Review.
    let owner_after = ledger.account(owner).await.unwrap();
    let worker_after = ledger.account(worker).await.unwrap();
    assert_eq!(owner_after.balance, owner_before.balance);
    assert_eq!(owner_after.assigned_balance, owner_before.assigned_balance);
    assert_eq!(worker_after.balance, worker_before.balance);
    assert_eq!(worker_after.total_earnings, worker_before.total_earnings);
    assert_eq!(worker_after.in_progress_count, worker_before.in_progress_count);
    assert_eq!(
        ledger
            .balance(AccountId::platform_treasury())
            .await
            .unwrap(),
        Credits::ZERO
    );
    assert_eq!(
        market.claim(claim.id).await.unwrap().status,
        ClaimStatus::Review
    );

    // Storage failures are the retriable class: once the fault clears,
    // the same approval succeeds.
    store.disarm();
    let breakdown = market
        .verify_proof(claim.id, owner, true)
        .await
        .unwrap()
        .expect("approved");
    assert_eq!(breakdown.worker_share, Credits::from_credits(9.0));
    assert_eq!(
        market.claim(claim.id).await.unwrap().status,
        ClaimStatus::Completed
    );
}
