use crate::error::{MarketError, Result};
use crate::store::TaskBook;
use crate::types::{Claim, TaskId, TaskStatus};
use chrono::Utc;
use std::sync::Arc;
use taskforge_ledger::{AccountId, AccountLedger};
use tracing::{info, warn};

/// Arbitrates concurrent worker claims over a task's bounded slot pool.
///
/// The precondition chain and the decrement of `slots_remaining` execute
/// under one `TaskBook` write guard — a compare-and-decrement. Two
/// workers racing for the last slot serialize on the guard; the second
/// one re-evaluates against the decremented counter and fails.
pub struct SlotAllocator {
    book: TaskBook,
    ledger: Arc<AccountLedger>,
}

impl SlotAllocator {
    pub fn new(book: TaskBook, ledger: Arc<AccountLedger>) -> Self {
        Self { book, ledger }
    }

    /// Claim one slot for `worker`.
    ///
    /// Failures, in evaluation order: `TaskNotFound`,
    /// `SelfAcceptForbidden`, `TaskNotAvailable`/`TaskPaused`,
    /// `NoSlotsAvailable`, `AlreadyAccepted`.
    pub async fn accept_slot(&self, task_id: TaskId, worker: AccountId) -> Result<Claim> {
        let mut book = self.book.write().await;

        let task = book.task(task_id)?;
        if task.owner == worker {
            return Err(MarketError::SelfAcceptForbidden(task_id));
        }
        match task.status {
            TaskStatus::Published => {}
            TaskStatus::Paused => return Err(MarketError::TaskPaused(task_id)),
            status => {
                return Err(MarketError::TaskNotAvailable { task_id, status });
            }
        }
        if task.slots_remaining == 0 {
            return Err(MarketError::NoSlotsAvailable(task_id));
        }
        if book.has_open_claim(task_id, worker) {
            return Err(MarketError::AlreadyAccepted { task_id, worker });
        }

        let unit_price = task.unit_price;
        let task = book.task_mut(task_id)?;
        task.slots_remaining -= 1;
        task.updated_at = Utc::now();
        let slots_left = task.slots_remaining;

        let claim = book.insert_claim(task_id, worker, unit_price);

        // The claim exists either way; the counter is a profile statistic,
        // not a correctness gate.
        if let Err(e) = self.ledger.claim_started(worker).await {
            warn!(worker = %worker, error = %e, "Failed to bump in-progress counter");
        }

        info!(
            task_id,
            claim_id = claim.id,
            worker = %worker,
            slots_left,
            "🤝 Slot accepted"
        );
        Ok(claim)
    }
}
