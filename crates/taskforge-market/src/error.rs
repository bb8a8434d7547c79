use crate::types::{ClaimId, TaskId, TaskStatus};
use taskforge_ledger::{AccountId, LedgerError};
use thiserror::Error;

/// Market error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    /// Task id does not exist
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Claim id does not exist
    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// Publish attempted while the task already holds escrow
    #[error("Task already published: {0}")]
    TaskAlreadyPublished(TaskId),

    /// Task is not accepting claims in its current status
    #[error("Task {task_id} not available: status {status:?}")]
    TaskNotAvailable { task_id: TaskId, status: TaskStatus },

    /// Task is live but frozen by the owner
    #[error("Task paused: {0}")]
    TaskPaused(TaskId),

    /// All paid slots have been claimed
    #[error("No slots available on task {0}")]
    NoSlotsAvailable(TaskId),

    /// The worker already holds an open claim on this task
    #[error("Worker {worker} already holds a claim on task {task_id}")]
    AlreadyAccepted { task_id: TaskId, worker: AccountId },

    /// The task owner may not claim their own slots
    #[error("Owner may not accept a slot on their own task {0}")]
    SelfAcceptForbidden(TaskId),

    /// Transition not in the lifecycle table
    #[error("Invalid state transition: from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Operation not valid in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller is not allowed to perform this operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rejected before any mutation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for market operations
pub type Result<T> = std::result::Result<T, MarketError>;
