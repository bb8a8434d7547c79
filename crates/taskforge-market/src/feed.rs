use crate::error::Result;
use crate::store::TaskBook;
use crate::types::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskforge_ledger::{AccountId, AccountLedger, Credits};
use tracing::debug;

/// Filters a worker applies when browsing the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedFilter {
    pub owner: Option<AccountId>,
    pub min_unit_price: Option<Credits>,
    pub max_unit_price: Option<Credits>,
    /// Hide tasks this worker already holds an open claim on.
    pub exclude_claimed_by: Option<AccountId>,
}

/// One feed row: the task plus how many of its slots the owner can
/// actually fund right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub task: Task,
    pub available_slots: u32,
}

pub use taskforge_app_common::{Page, Paginated};

/// Read-only projection of what is claimable *and affordable* right now.
///
/// `slots_remaining` can overstate reality once the owner's funds have
/// dropped below what their published tasks assume. This walk simulates
/// each owner's live funds (spendable plus assigned escrow — remaining
/// slots are backed by the latter) across their tasks, oldest first, and
/// annotates what survives. It never mutates anything — the allocator's
/// compare-and-decrement remains the only gate that counts.
pub struct FeedSimulator {
    book: TaskBook,
    ledger: Arc<AccountLedger>,
}

impl FeedSimulator {
    pub fn new(book: TaskBook, ledger: Arc<AccountLedger>) -> Self {
        Self { book, ledger }
    }

    /// List claimable tasks, annotated with affordable slot counts.
    ///
    /// Pagination is applied after the affordability filter, since the
    /// filter changes the result-set size.
    pub async fn list_available(
        &self,
        filter: &FeedFilter,
        page: Page,
    ) -> Result<Paginated<FeedEntry>> {
        let candidates: Vec<Task> = {
            let book = self.book.read().await;
            book.tasks()
                .filter(|t| t.status == TaskStatus::Published && t.slots_remaining >= 1)
                .filter(|t| filter.owner.map(|o| t.owner == o).unwrap_or(true))
                .filter(|t| filter.min_unit_price.map(|p| t.unit_price >= p).unwrap_or(true))
                .filter(|t| filter.max_unit_price.map(|p| t.unit_price <= p).unwrap_or(true))
                .filter(|t| {
                    filter
                        .exclude_claimed_by
                        .map(|w| !book.has_open_claim(t.id, w))
                        .unwrap_or(true)
                })
                .cloned()
                .collect()
        };
        let candidate_count = candidates.len();

        let mut by_owner: HashMap<AccountId, Vec<Task>> = HashMap::new();
        for task in candidates {
            by_owner.entry(task.owner).or_default().push(task);
        }

        let mut entries: Vec<FeedEntry> = Vec::new();
        for (owner, mut tasks) in by_owner {
            // Earliest-created tasks get funding priority.
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

            // Lock-free read; the projection is advisory and tolerates
            // staleness.
            let record = self.ledger.account(owner).await?;
            let mut walk = record.balance.saturating_add(record.assigned_balance);

            for task in tasks {
                let price = task.unit_price.to_base_units();
                if price == 0 {
                    continue;
                }
                let fundable = (walk.to_base_units() / price).min(u32::MAX as u64) as u32;
                let affordable = task.slots_remaining.min(fundable);
                if affordable == 0 {
                    continue;
                }

                walk = walk.saturating_sub(
                    task.unit_price
                        .checked_mul_u32(affordable)
                        .unwrap_or(Credits::ZERO),
                );
                entries.push(FeedEntry {
                    task,
                    available_slots: affordable,
                });
            }
        }

        // Newest first across owners for display.
        entries.sort_by(|a, b| {
            b.task
                .created_at
                .cmp(&a.task.created_at)
                .then(b.task.id.cmp(&a.task.id))
        });

        debug!(
            candidates = candidate_count,
            affordable = entries.len(),
            "Feed simulated"
        );
        Ok(taskforge_app_common::paginate(entries, page))
    }
}
