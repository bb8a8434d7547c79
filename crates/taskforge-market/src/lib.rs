//! # TaskForge Market
//!
//! Capacity-allocation core of the TaskForge marketplace:
//!
//! - **Publication state machine**: `Review → Published ⇄ Paused /
//!   Unpublished → Completed`, moving provider funds between spendable
//!   balance and assigned escrow on every transition that needs it.
//! - **Slot allocator**: bounded compare-and-decrement over a task's
//!   remaining paid slots; racing workers serialize on the task book.
//! - **Proof & payout workflow**: per-claim `Active → Review →
//!   Completed | Rejected`, settling approved claims through the
//!   ledger's atomic payout split.
//! - **Feed simulator**: read-only projection of which slots a
//!   provider can actually fund right now.
//!
//! The [`MarketCoordinator`] wires these over one shared [`TaskBook`]
//! and the account ledger; transport and auth live outside this crate.

pub mod allocation;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod payout;
pub mod publication;
pub mod store;
pub mod types;

pub use allocation::SlotAllocator;
pub use coordinator::{MarketConfig, MarketCoordinator, MarketStats};
pub use error::{MarketError, Result};
pub use feed::{FeedEntry, FeedFilter, FeedSimulator};
pub use payout::{PayoutConfig, PayoutWorkflow};
pub use publication::{PublicationConfig, PublicationManager};
pub use store::TaskBook;
pub use types::{Claim, ClaimId, ClaimStatus, Task, TaskId, TaskSpec, TaskStatus};
