use crate::error::{MarketError, Result};
use crate::types::{Claim, ClaimId, ClaimStatus, Task, TaskId, TaskSpec, TaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use taskforge_ledger::{AccountId, Credits};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutable interior of the [`TaskBook`].
///
/// Managers in this crate hold the book's write guard across an entire
/// check-and-mutate sequence, so every precondition they validate still
/// holds when they write. Ids are sequences allocated here, under the
/// same guard — never a process-global counter.
#[derive(Default)]
pub(crate) struct TaskBookState {
    tasks: HashMap<TaskId, Task>,
    claims: HashMap<ClaimId, Claim>,
    task_claims: HashMap<TaskId, Vec<ClaimId>>,
    worker_claims: HashMap<AccountId, Vec<ClaimId>>,
    next_task_id: u64,
    next_claim_id: u64,
}

impl TaskBookState {
    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(MarketError::TaskNotFound(id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(MarketError::TaskNotFound(id))
    }

    pub fn claim(&self, id: ClaimId) -> Result<&Claim> {
        self.claims.get(&id).ok_or(MarketError::ClaimNotFound(id))
    }

    pub fn claim_mut(&mut self, id: ClaimId) -> Result<&mut Claim> {
        self.claims.get_mut(&id).ok_or(MarketError::ClaimNotFound(id))
    }

    pub fn insert_task(&mut self, owner: AccountId, spec: TaskSpec) -> Task {
        self.next_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: self.next_task_id,
            owner,
            title: spec.title,
            description: spec.description,
            unit_price: spec.unit_price,
            slots_original: spec.slots,
            slots_remaining: spec.slots,
            total_escrow: Credits::ZERO,
            status: TaskStatus::Review,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id, task.clone());
        task
    }

    pub fn insert_claim(&mut self, task_id: TaskId, worker: AccountId, unit_price: Credits) -> Claim {
        self.next_claim_id += 1;
        let claim = Claim {
            id: self.next_claim_id,
            task_id,
            worker,
            unit_price,
            status: ClaimStatus::Active,
            proof_refs: Vec::new(),
            accepted_at: Utc::now(),
            submitted_at: None,
            resolved_at: None,
        };
        self.claims.insert(claim.id, claim.clone());
        self.task_claims.entry(task_id).or_default().push(claim.id);
        self.worker_claims.entry(worker).or_default().push(claim.id);
        claim
    }

    /// Does the worker hold a non-terminal claim on this task?
    pub fn has_open_claim(&self, task_id: TaskId, worker: AccountId) -> bool {
        self.worker_claims
            .get(&worker)
            .map(|ids| {
                ids.iter().any(|id| {
                    self.claims
                        .get(id)
                        .map(|c| c.task_id == task_id && c.is_open())
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    pub fn open_claim_count(&self, task_id: TaskId) -> usize {
        self.task_claims
            .get(&task_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| self.claims.get(id).map(|c| c.is_open()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn claims_for_task(&self, task_id: TaskId) -> Vec<Claim> {
        self.task_claims
            .get(&task_id)
            .map(|ids| ids.iter().filter_map(|id| self.claims.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn claims_for_worker(&self, worker: AccountId) -> Vec<Claim> {
        self.worker_claims
            .get(&worker)
            .map(|ids| ids.iter().filter_map(|id| self.claims.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}

/// Shared task/claim state for the market managers.
#[derive(Clone, Default)]
pub struct TaskBook {
    inner: Arc<RwLock<TaskBookState>>,
}

impl TaskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, TaskBookState> {
        self.inner.write().await
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, TaskBookState> {
        self.inner.read().await
    }

    pub async fn task(&self, id: TaskId) -> Result<Task> {
        let book = self.inner.read().await;
        book.task(id).cloned()
    }

    pub async fn claim(&self, id: ClaimId) -> Result<Claim> {
        let book = self.inner.read().await;
        book.claim(id).cloned()
    }

    pub async fn tasks_by_owner(&self, owner: AccountId) -> Vec<Task> {
        let book = self.inner.read().await;
        let mut tasks: Vec<Task> = book.tasks().filter(|t| t.owner == owner).cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub async fn published_tasks(&self) -> Vec<Task> {
        let book = self.inner.read().await;
        let mut tasks: Vec<Task> = book
            .tasks()
            .filter(|t| t.status == TaskStatus::Published)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub async fn claims_for_task(&self, task_id: TaskId) -> Vec<Claim> {
        let book = self.inner.read().await;
        book.claims_for_task(task_id)
    }

    pub async fn claims_for_worker(&self, worker: AccountId) -> Vec<Claim> {
        let book = self.inner.read().await;
        book.claims_for_worker(worker)
    }
}
