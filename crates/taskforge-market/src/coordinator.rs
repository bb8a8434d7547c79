use crate::allocation::SlotAllocator;
use crate::error::Result;
use crate::feed::{FeedEntry, FeedFilter, FeedSimulator};
use crate::payout::{PayoutConfig, PayoutWorkflow};
use crate::publication::{PublicationConfig, PublicationManager};
use crate::store::TaskBook;
use crate::types::{Claim, ClaimId, Task, TaskId, TaskSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskforge_app_common::{Page, Paginated};
use taskforge_ledger::{AccountId, AccountLedger, Credits, PayoutBreakdown};

/// Configuration for the market coordinator
#[derive(Debug, Clone, Default)]
pub struct MarketConfig {
    pub publication: PublicationConfig,
    pub payout: PayoutConfig,
}

/// Aggregate market counters for dashboards and monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_tasks: u64,
    pub tasks_in_review: u64,
    pub tasks_published: u64,
    pub tasks_paused: u64,
    pub tasks_unpublished: u64,
    pub tasks_completed: u64,
    pub tasks_rejected: u64,
    pub claims_active: u64,
    pub claims_in_review: u64,
    pub claims_completed: u64,
    pub claims_rejected: u64,
    /// Escrow still owed: unclaimed published slots plus open claims.
    pub escrow_outstanding: Credits,
}

/// Central coordinator for the task market.
///
/// Wires the publication state machine, slot allocator, payout workflow,
/// and feed simulator over one shared [`TaskBook`] and ledger, and
/// exposes the operation surface the transport layer calls into.
pub struct MarketCoordinator {
    book: TaskBook,
    ledger: Arc<AccountLedger>,
    publication: Arc<PublicationManager>,
    allocator: Arc<SlotAllocator>,
    payouts: Arc<PayoutWorkflow>,
    feed: Arc<FeedSimulator>,
}

impl MarketCoordinator {
    pub fn new(config: MarketConfig, ledger: Arc<AccountLedger>) -> Self {
        let book = TaskBook::new();
        let publication = Arc::new(PublicationManager::new(
            config.publication,
            book.clone(),
            ledger.clone(),
        ));
        let allocator = Arc::new(SlotAllocator::new(book.clone(), ledger.clone()));
        let payouts = Arc::new(PayoutWorkflow::new(
            config.payout,
            book.clone(),
            ledger.clone(),
            publication.clone(),
        ));
        let feed = Arc::new(FeedSimulator::new(book.clone(), ledger.clone()));

        Self {
            book,
            ledger,
            publication,
            allocator,
            payouts,
            feed,
        }
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    // ---- publication ----

    pub async fn create_task(&self, owner: AccountId, spec: TaskSpec) -> Result<Task> {
        self.publication.create_task(owner, spec).await
    }

    pub async fn add_moderator(&self, moderator: AccountId) {
        self.publication.add_moderator(moderator).await;
    }

    pub async fn reject_task(&self, task_id: TaskId, moderator: AccountId) -> Result<()> {
        self.publication.reject_task(task_id, moderator).await
    }

    /// Returns the escrow reserved for the publication.
    pub async fn publish_task(&self, task_id: TaskId, owner: AccountId) -> Result<Credits> {
        self.publication.publish(task_id, owner).await
    }

    /// Returns the refunded amount.
    pub async fn unpublish_task(&self, task_id: TaskId, owner: AccountId) -> Result<Credits> {
        self.publication.unpublish(task_id, owner).await
    }

    pub async fn pause_task(&self, task_id: TaskId, owner: AccountId) -> Result<()> {
        self.publication.pause(task_id, owner).await
    }

    pub async fn resume_task(&self, task_id: TaskId, owner: AccountId) -> Result<()> {
        self.publication.resume(task_id, owner).await
    }

    pub async fn edit_task(
        &self,
        task_id: TaskId,
        owner: AccountId,
        new_unit_price: Option<Credits>,
        new_slots_remaining: Option<u32>,
    ) -> Result<Task> {
        self.publication
            .edit_published(task_id, owner, new_unit_price, new_slots_remaining)
            .await
    }

    // ---- allocation & payout ----

    pub async fn accept_slot(&self, task_id: TaskId, worker: AccountId) -> Result<Claim> {
        self.allocator.accept_slot(task_id, worker).await
    }

    pub async fn submit_proof(
        &self,
        claim_id: ClaimId,
        worker: AccountId,
        proof_refs: Vec<String>,
    ) -> Result<()> {
        self.payouts.submit_proof(claim_id, worker, proof_refs).await
    }

    pub async fn verify_proof(
        &self,
        claim_id: ClaimId,
        approver: AccountId,
        approve: bool,
    ) -> Result<Option<PayoutBreakdown>> {
        self.payouts.verify_proof(claim_id, approver, approve).await
    }

    // ---- reads ----

    pub async fn task(&self, task_id: TaskId) -> Result<Task> {
        self.book.task(task_id).await
    }

    pub async fn claim(&self, claim_id: ClaimId) -> Result<Claim> {
        self.book.claim(claim_id).await
    }

    pub async fn tasks_by_owner(&self, owner: AccountId) -> Vec<Task> {
        self.book.tasks_by_owner(owner).await
    }

    pub async fn claims_for_worker(&self, worker: AccountId) -> Vec<Claim> {
        self.book.claims_for_worker(worker).await
    }

    pub async fn claims_for_task(&self, task_id: TaskId) -> Vec<Claim> {
        self.book.claims_for_task(task_id).await
    }

    pub async fn list_available_tasks(
        &self,
        filter: &FeedFilter,
        page: Page,
    ) -> Result<Paginated<FeedEntry>> {
        self.feed.list_available(filter, page).await
    }

    pub async fn market_stats(&self) -> MarketStats {
        use crate::types::{ClaimStatus, TaskStatus};

        let book = self.book.read().await;
        let mut stats = MarketStats::default();

        for task in book.tasks() {
            stats.total_tasks += 1;
            match task.status {
                TaskStatus::Review => stats.tasks_in_review += 1,
                TaskStatus::Published => stats.tasks_published += 1,
                TaskStatus::Paused => stats.tasks_paused += 1,
                TaskStatus::Unpublished => stats.tasks_unpublished += 1,
                TaskStatus::Completed => stats.tasks_completed += 1,
                TaskStatus::Rejected => stats.tasks_rejected += 1,
            }
            if matches!(task.status, TaskStatus::Published | TaskStatus::Paused) {
                stats.escrow_outstanding = stats
                    .escrow_outstanding
                    .saturating_add(task.remaining_escrow());
            }
        }

        for task in book.tasks() {
            for claim in book.claims_for_task(task.id) {
                match claim.status {
                    ClaimStatus::Active => stats.claims_active += 1,
                    ClaimStatus::Review => stats.claims_in_review += 1,
                    ClaimStatus::Completed => stats.claims_completed += 1,
                    ClaimStatus::Rejected => stats.claims_rejected += 1,
                }
                if claim.is_open() {
                    stats.escrow_outstanding =
                        stats.escrow_outstanding.saturating_add(claim.unit_price);
                }
            }
        }

        stats
    }
}
