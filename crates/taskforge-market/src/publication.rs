use crate::error::{MarketError, Result};
use crate::store::TaskBook;
use crate::types::{Task, TaskId, TaskSpec, TaskStatus};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use taskforge_app_common::LifecycleState;
use taskforge_ledger::{AccountId, AccountLedger, Credits};
use tokio::sync::RwLock;
use tracing::info;

/// Configuration for task publication
#[derive(Debug, Clone)]
pub struct PublicationConfig {
    /// Smallest accepted per-slot price
    pub min_unit_price: Credits,
    /// Largest accepted slot count per task
    pub max_slots_per_task: u32,
    /// Longest accepted title
    pub max_title_len: usize,
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            min_unit_price: Credits::from_base_units(1),
            max_slots_per_task: 10_000,
            max_title_len: 200,
        }
    }
}

/// Task publication state machine.
///
/// Owns every owner-driven task transition and the escrow movements that
/// go with them. Transitions run under the book's write guard, so the
/// status a precondition observed is still the status being replaced
/// when the escrow call returns.
pub struct PublicationManager {
    config: PublicationConfig,
    book: TaskBook,
    ledger: Arc<AccountLedger>,
    moderators: Arc<RwLock<HashSet<AccountId>>>,
}

impl PublicationManager {
    pub fn new(config: PublicationConfig, book: TaskBook, ledger: Arc<AccountLedger>) -> Self {
        Self {
            config,
            book,
            ledger,
            moderators: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub async fn add_moderator(&self, moderator: AccountId) {
        let mut moderators = self.moderators.write().await;
        moderators.insert(moderator);
        info!(moderator = %moderator, "Moderator registered");
    }

    /// Create a task in `Review`. No funds move until publish.
    pub async fn create_task(&self, owner: AccountId, spec: TaskSpec) -> Result<Task> {
        if spec.title.trim().is_empty() {
            return Err(MarketError::Validation("title must not be empty".to_string()));
        }
        if spec.title.len() > self.config.max_title_len {
            return Err(MarketError::Validation(format!(
                "title exceeds {} characters",
                self.config.max_title_len
            )));
        }
        if spec.unit_price < self.config.min_unit_price || spec.unit_price.is_zero() {
            return Err(MarketError::Validation(format!(
                "unit price below minimum {}",
                self.config.min_unit_price
            )));
        }
        if spec.slots == 0 || spec.slots > self.config.max_slots_per_task {
            return Err(MarketError::Validation(format!(
                "slot count must be between 1 and {}",
                self.config.max_slots_per_task
            )));
        }

        let mut book = self.book.write().await;
        let task = book.insert_task(owner, spec);

        info!(
            task_id = task.id,
            owner = %owner,
            unit_price = %task.unit_price,
            slots = task.slots_original,
            "📋 Task created"
        );
        Ok(task)
    }

    /// Moderation rejection: `Review → Rejected`, terminal.
    pub async fn reject_task(&self, task_id: TaskId, moderator: AccountId) -> Result<()> {
        if !self.moderators.read().await.contains(&moderator) {
            return Err(MarketError::Unauthorized(format!(
                "{} is not a moderator",
                moderator
            )));
        }

        let mut book = self.book.write().await;
        let task = book.task_mut(task_id)?;
        if !task.status.can_transition_to(&TaskStatus::Rejected) {
            return Err(MarketError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Rejected,
            });
        }

        task.status = TaskStatus::Rejected;
        task.updated_at = Utc::now();

        info!(task_id, moderator = %moderator, "🚫 Task rejected in review");
        Ok(())
    }

    /// Publish: reserve escrow for every unclaimed slot and open the task.
    ///
    /// Returns the amount reserved. On the first publish the whole
    /// capacity is unclaimed, so this is `unit_price × slots_original`; a
    /// republish reserves only the slots still remaining (consumed slots
    /// keep their escrow with their open claims).
    pub async fn publish(&self, task_id: TaskId, owner: AccountId) -> Result<Credits> {
        let mut book = self.book.write().await;
        let task = book.task_mut(task_id)?;

        if task.owner != owner {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own task {}",
                owner, task_id
            )));
        }
        if matches!(task.status, TaskStatus::Published | TaskStatus::Paused) {
            return Err(MarketError::TaskAlreadyPublished(task_id));
        }
        if !task.status.can_transition_to(&TaskStatus::Published) {
            return Err(MarketError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Published,
            });
        }

        let escrow = task
            .unit_price
            .checked_mul_u32(task.slots_remaining)
            .ok_or_else(|| MarketError::Validation("escrow amount overflow".to_string()))?;

        // The guard is still held: a racing second publish waits here and
        // then fails the TaskAlreadyPublished check above.
        self.ledger.reserve(owner, escrow).await?;

        let task = book.task_mut(task_id)?;
        task.status = TaskStatus::Published;
        task.total_escrow = task
            .unit_price
            .checked_mul_u32(task.slots_original)
            .unwrap_or(escrow);
        task.updated_at = Utc::now();

        info!(
            task_id,
            owner = %owner,
            escrow = %escrow,
            slots = task.slots_remaining,
            "📢 Task published"
        );
        Ok(escrow)
    }

    /// Take the task down and refund the escrow of every unclaimed slot.
    ///
    /// Idempotent: unpublishing an already-unpublished task refunds zero.
    /// Escrow backing open claims stays reserved until those claims
    /// resolve.
    pub async fn unpublish(&self, task_id: TaskId, owner: AccountId) -> Result<Credits> {
        let mut book = self.book.write().await;
        let task = book.task_mut(task_id)?;

        if task.owner != owner {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own task {}",
                owner, task_id
            )));
        }
        if task.status == TaskStatus::Unpublished {
            return Ok(Credits::ZERO);
        }
        if !task.status.can_transition_to(&TaskStatus::Unpublished) {
            return Err(MarketError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Unpublished,
            });
        }

        let refund = task.remaining_escrow();
        self.ledger.release(owner, refund).await?;

        let task = book.task_mut(task_id)?;
        task.status = TaskStatus::Unpublished;
        task.updated_at = Utc::now();

        info!(
            task_id,
            owner = %owner,
            refund = %refund,
            "📴 Task unpublished"
        );
        Ok(refund)
    }

    /// Freeze claims without moving funds.
    pub async fn pause(&self, task_id: TaskId, owner: AccountId) -> Result<()> {
        self.toggle_pause(task_id, owner, TaskStatus::Published, TaskStatus::Paused)
            .await
    }

    /// Reopen a paused task.
    pub async fn resume(&self, task_id: TaskId, owner: AccountId) -> Result<()> {
        self.toggle_pause(task_id, owner, TaskStatus::Paused, TaskStatus::Published)
            .await
    }

    async fn toggle_pause(
        &self,
        task_id: TaskId,
        owner: AccountId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<()> {
        let mut book = self.book.write().await;
        let task = book.task_mut(task_id)?;

        if task.owner != owner {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own task {}",
                owner, task_id
            )));
        }
        if task.status != from {
            return Err(MarketError::InvalidTransition {
                from: task.status,
                to,
            });
        }

        task.status = to;
        task.updated_at = Utc::now();
        info!(task_id, owner = %owner, status = ?to, "⏯️ Task pause toggled");
        Ok(())
    }

    /// Edit price and/or remaining slot count on a live task.
    ///
    /// The escrow delta is settled up front: an increase reserves the
    /// difference (and the whole edit fails on `InsufficientBalance`), a
    /// decrease releases the surplus. Open claims are untouched — they
    /// pay out at the price captured when they were accepted.
    pub async fn edit_published(
        &self,
        task_id: TaskId,
        owner: AccountId,
        new_unit_price: Option<Credits>,
        new_slots_remaining: Option<u32>,
    ) -> Result<Task> {
        let mut book = self.book.write().await;
        let task = book.task_mut(task_id)?;

        if task.owner != owner {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own task {}",
                owner, task_id
            )));
        }
        if !matches!(task.status, TaskStatus::Published | TaskStatus::Paused) {
            return Err(MarketError::InvalidState(format!(
                "task {} is not live (status {:?})",
                task_id, task.status
            )));
        }

        let price = new_unit_price.unwrap_or(task.unit_price);
        let slots = new_slots_remaining.unwrap_or(task.slots_remaining);
        if price < self.config.min_unit_price || price.is_zero() {
            return Err(MarketError::Validation(format!(
                "unit price below minimum {}",
                self.config.min_unit_price
            )));
        }
        if slots > self.config.max_slots_per_task {
            return Err(MarketError::Validation(format!(
                "slot count must not exceed {}",
                self.config.max_slots_per_task
            )));
        }

        let old_required = task.remaining_escrow();
        let new_required = price
            .checked_mul_u32(slots)
            .ok_or_else(|| MarketError::Validation("escrow amount overflow".to_string()))?;

        if new_required > old_required {
            self.ledger
                .reserve(owner, new_required.saturating_sub(old_required))
                .await?;
        } else if old_required > new_required {
            self.ledger
                .release(owner, old_required.saturating_sub(new_required))
                .await?;
        }

        let consumed = task.slots_original - task.slots_remaining;
        let task = book.task_mut(task_id)?;
        task.unit_price = price;
        task.slots_remaining = slots;
        task.slots_original = consumed + slots;
        task.updated_at = Utc::now();

        info!(
            task_id,
            owner = %owner,
            unit_price = %price,
            slots_remaining = slots,
            escrow_before = %old_required,
            escrow_after = %new_required,
            "✏️ Task edited"
        );
        Ok(task.clone())
    }

    /// Close out a task whose capacity is fully consumed and verified.
    pub(crate) async fn complete_if_exhausted(&self, task_id: TaskId) -> Result<bool> {
        let mut book = self.book.write().await;
        let open_claims = book.open_claim_count(task_id);
        let task = book.task_mut(task_id)?;

        if task.status == TaskStatus::Published && task.slots_remaining == 0 && open_claims == 0 {
            task.status = TaskStatus::Completed;
            task.updated_at = Utc::now();
            info!(task_id, "🏁 Task completed");
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_ledger::{MemoryLedgerStore, TransferReason};

    fn setup() -> (PublicationManager, Arc<AccountLedger>, TaskBook) {
        let ledger = Arc::new(AccountLedger::new(Arc::new(MemoryLedgerStore::new())));
        let book = TaskBook::new();
        let manager = PublicationManager::new(PublicationConfig::default(), book.clone(), ledger.clone());
        (manager, ledger, book)
    }

    fn spec(price: f64, slots: u32) -> TaskSpec {
        TaskSpec {
            title: "Transcribe audio".to_string(),
            description: "10 minute clip".to_string(),
            unit_price: Credits::from_credits(price),
            slots,
        }
    }

    async fn fund(ledger: &AccountLedger, owner: AccountId, amount: f64) {
        ledger
            .credit(owner, Credits::from_credits(amount), TransferReason::DepositApproved)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_reserves_full_escrow() {
        let (manager, ledger, _) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        fund(&ledger, owner, 100.0).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();
        let escrow = manager.publish(task.id, owner).await.unwrap();

        assert_eq!(escrow, Credits::from_credits(50.0));
        assert_eq!(ledger.balance(owner).await.unwrap(), Credits::from_credits(50.0));
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(50.0)
        );
    }

    #[tokio::test]
    async fn test_publish_twice_conflicts() {
        let (manager, ledger, _) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        fund(&ledger, owner, 100.0).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();
        manager.publish(task.id, owner).await.unwrap();

        let err = manager.publish(task.id, owner).await.unwrap_err();
        assert_eq!(err, MarketError::TaskAlreadyPublished(task.id));
        // The failed second publish reserved nothing extra.
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(50.0)
        );
    }

    #[tokio::test]
    async fn test_publish_with_insufficient_balance() {
        let (manager, ledger, book) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        fund(&ledger, owner, 30.0).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();
        let err = manager.publish(task.id, owner).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Ledger(taskforge_ledger::LedgerError::InsufficientBalance { .. })
        ));

        // No state change on failure.
        assert_eq!(book.task(task.id).await.unwrap().status, TaskStatus::Review);
        assert_eq!(ledger.balance(owner).await.unwrap(), Credits::from_credits(30.0));
    }

    #[tokio::test]
    async fn test_unpublish_refunds_remaining_and_is_idempotent() {
        let (manager, ledger, book) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        fund(&ledger, owner, 100.0).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();
        manager.publish(task.id, owner).await.unwrap();

        // Two slots claimed; their escrow stays with the claims.
        {
            let mut state = book.write().await;
            state.task_mut(task.id).unwrap().slots_remaining = 3;
        }

        let refund = manager.unpublish(task.id, owner).await.unwrap();
        assert_eq!(refund, Credits::from_credits(30.0));
        assert_eq!(ledger.balance(owner).await.unwrap(), Credits::from_credits(80.0));
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(20.0)
        );

        let refund_again = manager.unpublish(task.id, owner).await.unwrap();
        assert_eq!(refund_again, Credits::ZERO);
        assert_eq!(ledger.balance(owner).await.unwrap(), Credits::from_credits(80.0));
    }

    #[tokio::test]
    async fn test_edit_reserves_delta_or_releases_surplus() {
        let (manager, ledger, _) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        fund(&ledger, owner, 100.0).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();
        manager.publish(task.id, owner).await.unwrap();

        // 5 slots at 10.0 → 5 slots at 12.0: reserve 10 more.
        let edited = manager
            .edit_published(task.id, owner, Some(Credits::from_credits(12.0)), None)
            .await
            .unwrap();
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(60.0)
        );
        assert_eq!(edited.unit_price, Credits::from_credits(12.0));

        // Down to 2 slots: release 36.
        manager
            .edit_published(task.id, owner, None, Some(2))
            .await
            .unwrap();
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(24.0)
        );

        // An unaffordable increase fails the whole edit.
        let err = manager
            .edit_published(task.id, owner, None, Some(10_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Ledger(taskforge_ledger::LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(
            ledger.assigned_balance(owner).await.unwrap(),
            Credits::from_credits(24.0)
        );
    }

    #[tokio::test]
    async fn test_moderation_rejection() {
        let (manager, _ledger, book) = setup();
        let owner = AccountId::from_bytes([1; 32]);
        let moderator = AccountId::from_bytes([0xAB; 32]);
        manager.add_moderator(moderator).await;

        let task = manager.create_task(owner, spec(10.0, 5)).await.unwrap();

        let err = manager.reject_task(task.id, owner).await.unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));

        manager.reject_task(task.id, moderator).await.unwrap();
        assert_eq!(book.task(task.id).await.unwrap().status, TaskStatus::Rejected);

        // Terminal: publish now fails.
        let err = manager.publish(task.id, owner).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }
}
