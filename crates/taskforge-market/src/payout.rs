use crate::error::{MarketError, Result};
use crate::publication::PublicationManager;
use crate::store::TaskBook;
use crate::types::{ClaimId, ClaimStatus, TaskStatus};
use chrono::Utc;
use std::sync::Arc;
use taskforge_ledger::{AccountId, AccountLedger, PayoutBreakdown};
use tracing::info;

/// Configuration for proof verification and payout
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Worker's share of the unit price, in basis points (9000 = 90%).
    pub payout_rate_bps: u16,
    /// Whether a rejected claim's slot returns to the available pool.
    /// When false the attempt is consumed and the slot's escrow goes
    /// back to the owner's spendable balance.
    pub restore_slot_on_reject: bool,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            payout_rate_bps: 9_000,
            restore_slot_on_reject: false,
        }
    }
}

/// Per-claim proof workflow: `Active → Review → Completed | Rejected`.
///
/// Approval settles funds through the ledger's multi-row payout; the
/// claim state only advances after that transaction committed, so a
/// caller can never observe a completed claim without its payout (or
/// the reverse).
pub struct PayoutWorkflow {
    config: PayoutConfig,
    book: TaskBook,
    ledger: Arc<AccountLedger>,
    publication: Arc<PublicationManager>,
}

impl PayoutWorkflow {
    pub fn new(
        config: PayoutConfig,
        book: TaskBook,
        ledger: Arc<AccountLedger>,
        publication: Arc<PublicationManager>,
    ) -> Self {
        Self {
            config,
            book,
            ledger,
            publication,
        }
    }

    /// Worker hands in proof of completed work.
    pub async fn submit_proof(
        &self,
        claim_id: ClaimId,
        worker: AccountId,
        proof_refs: Vec<String>,
    ) -> Result<()> {
        if proof_refs.is_empty() || proof_refs.iter().any(|r| r.trim().is_empty()) {
            return Err(MarketError::Validation(
                "proof requires at least one non-empty reference".to_string(),
            ));
        }

        let mut book = self.book.write().await;
        let claim = book.claim_mut(claim_id)?;

        if claim.worker != worker {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own claim {}",
                worker, claim_id
            )));
        }
        if claim.status != ClaimStatus::Active {
            return Err(MarketError::InvalidState(format!(
                "claim {} is {:?}, expected Active",
                claim_id, claim.status
            )));
        }

        claim.status = ClaimStatus::Review;
        claim.proof_refs = proof_refs;
        claim.submitted_at = Some(Utc::now());

        info!(
            claim_id,
            worker = %worker,
            refs = claim.proof_refs.len(),
            "📬 Proof submitted"
        );
        Ok(())
    }

    /// Task owner accepts or rejects submitted proof.
    ///
    /// Approve settles the payout split; reject ends the claim with no
    /// fund movement to the worker. Returns the payout breakdown on
    /// approval, `None` on rejection.
    pub async fn verify_proof(
        &self,
        claim_id: ClaimId,
        approver: AccountId,
        approve: bool,
    ) -> Result<Option<PayoutBreakdown>> {
        let mut book = self.book.write().await;

        let claim = book.claim(claim_id)?.clone();
        let task = book.task(claim.task_id)?.clone();

        if task.owner != approver {
            return Err(MarketError::Unauthorized(format!(
                "{} does not own task {} behind claim {}",
                approver, task.id, claim_id
            )));
        }
        if claim.status != ClaimStatus::Review {
            return Err(MarketError::InvalidState(format!(
                "claim {} is {:?}, expected Review",
                claim_id, claim.status
            )));
        }

        if approve {
            // Funds first: the claim stays in Review if the split fails,
            // and the split itself is all-or-nothing inside the ledger.
            let breakdown = self
                .ledger
                .payout_split(
                    task.owner,
                    claim.worker,
                    claim.unit_price,
                    self.config.payout_rate_bps,
                )
                .await?;

            {
                let claim = book.claim_mut(claim_id)?;
                claim.status = ClaimStatus::Completed;
                claim.resolved_at = Some(Utc::now());
            }
            drop(book);

            self.publication.complete_if_exhausted(task.id).await?;

            info!(
                claim_id,
                task_id = task.id,
                worker = %claim.worker,
                worker_share = %breakdown.worker_share,
                platform_fee = %breakdown.platform_fee,
                "✅ Proof approved, payout settled"
            );
            Ok(Some(breakdown))
        } else {
            let restore = self.config.restore_slot_on_reject
                && matches!(task.status, TaskStatus::Published | TaskStatus::Paused);

            if restore {
                let task = book.task_mut(claim.task_id)?;
                task.slots_remaining += 1;
                task.updated_at = Utc::now();
            } else {
                // The attempt is consumed; the slot's escrow is no longer
                // owed to anyone and goes back to the owner.
                self.ledger.release(task.owner, claim.unit_price).await?;
            }

            {
                let claim = book.claim_mut(claim_id)?;
                claim.status = ClaimStatus::Rejected;
                claim.resolved_at = Some(Utc::now());
            }
            drop(book);

            if let Err(e) = self.ledger.claim_abandoned(claim.worker).await {
                tracing::warn!(worker = %claim.worker, error = %e, "Failed to drop in-progress counter");
            }

            info!(
                claim_id,
                task_id = task.id,
                slot_restored = restore,
                "🚫 Proof rejected"
            );
            Ok(None)
        }
    }
}
