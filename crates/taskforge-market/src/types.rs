use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskforge_app_common::LifecycleState;
use taskforge_ledger::{AccountId, Credits};

pub type TaskId = u64;
pub type ClaimId = u64;

/// Parameters supplied when a provider creates a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub unit_price: Credits,
    pub slots: u32,
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Created, awaiting moderation
    Review,
    /// Live: escrow reserved, slots claimable
    Published,
    /// Live but frozen: slots not claimable, no fund movement
    Paused,
    /// Taken down by the owner; remaining-slot escrow refunded
    Unpublished,
    /// Moderation rejected the task
    Rejected,
    /// All slots consumed and verified
    Completed,
}

impl LifecycleState for TaskStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use TaskStatus::*;
        match (self, next) {
            // From Review: the owner's publish doubles as moderation
            // acceptance; explicit rejection is terminal.
            (Review, Published) => true,
            (Review, Rejected) => true,

            // From Published
            (Published, Paused) => true,
            (Published, Unpublished) => true,
            (Published, Completed) => true,

            // From Paused
            (Paused, Published) => true,
            (Paused, Unpublished) => true,

            // Republish after taking the task down
            (Unpublished, Published) => true,

            // Terminal states cannot transition
            (Rejected, _) | (Completed, _) => false,

            _ => false,
        }
    }
}

/// One unit of paid capacity offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: AccountId,
    pub title: String,
    pub description: String,
    pub unit_price: Credits,
    /// Total capacity; `slots_original - slots_remaining` slots have been
    /// claimed.
    pub slots_original: u32,
    pub slots_remaining: u32,
    /// `unit_price × slots_original` recorded at publish time.
    pub total_escrow: Credits,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_paused(&self) -> bool {
        self.status == TaskStatus::Paused
    }

    /// Escrow still reserved for unclaimed slots.
    pub fn remaining_escrow(&self) -> Credits {
        self.unit_price
            .checked_mul_u32(self.slots_remaining)
            .unwrap_or(Credits::ZERO)
    }
}

/// Worker claim lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Slot claimed, work in progress
    Active,
    /// Proof submitted, awaiting the owner's verdict
    Review,
    /// Proof approved and paid out
    Completed,
    /// Proof rejected
    Rejected,
}

impl LifecycleState for ClaimStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Active, Review) | (Review, Completed) | (Review, Rejected)
        )
    }
}

/// A worker's attempt at one slot of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub task_id: TaskId,
    pub worker: AccountId,
    /// Price captured at accept time; an edit to the task while this
    /// claim is open does not change what it pays.
    pub unit_price: Credits,
    pub status: ClaimStatus,
    /// Opaque proof references (URLs/blob ids); storage is external.
    pub proof_refs: Vec<String>,
    pub accepted_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}
