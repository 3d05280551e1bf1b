//! Product registration and claim anchoring.
//!
//! Orchestrates the write path: batch-id generation, optimistic product
//! insert, claim persistence, and sequential attestation submission. The
//! product row always lands regardless of claim-proof outcomes; each claim's
//! anchoring succeeds or fails independently and is reported per claim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use veritag_consensus::{Attestation, SubmissionReceipt, SubmissionService};
use veritag_core::{BatchIdGenerator, Claim, Clock, Product};

use crate::{
    error::Result,
    storage::{BatchIdStoreAdapter, ProvenanceStorage},
};

/// One claim in a registration request.
#[derive(Debug, Clone)]
pub struct NewClaim {
    /// Claim category.
    pub claim_type: String,

    /// Human-readable claim text.
    pub description: String,
}

/// A product registration request.
#[derive(Debug, Clone)]
pub struct RegisterProductRequest {
    /// Product name; its first token seeds the batch-id prefix.
    pub product_name: String,

    /// Supplier name.
    pub supplier_name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Claims to anchor, submitted in the given order.
    pub claims: Vec<NewClaim>,
}

/// Per-claim anchoring result.
///
/// `receipt` without `error` is the fully anchored case. `receipt` with
/// `error` means the log acknowledged the attestation but the local
/// recording step failed: the claim is orphaned until reconciliation repairs
/// it. No receipt means submission itself failed and the claim stays without
/// proof.
#[derive(Debug, Clone)]
pub struct ClaimAnchorOutcome {
    /// The persisted claim.
    pub claim: Claim,

    /// Submission receipt, when the log acknowledged the attestation.
    pub receipt: Option<SubmissionReceipt>,

    /// What went wrong, if anything.
    pub error: Option<String>,
}

impl ClaimAnchorOutcome {
    /// Whether the claim was submitted and recorded locally.
    pub fn is_anchored(&self) -> bool {
        self.receipt.is_some() && self.error.is_none()
    }
}

/// Result of a registration request.
#[derive(Debug)]
pub struct RegistrationOutcome {
    /// The persisted product.
    pub product: Product,

    /// Receipt for the product attestation, when submission succeeded.
    pub product_receipt: Option<SubmissionReceipt>,

    /// Per-claim anchoring outcomes, in submission order.
    pub claim_outcomes: Vec<ClaimAnchorOutcome>,
}

impl RegistrationOutcome {
    /// Number of claims fully anchored (submitted and recorded).
    pub fn anchored_claims(&self) -> usize {
        self.claim_outcomes.iter().filter(|o| o.is_anchored()).count()
    }
}

/// Service orchestrating product registration and claim anchoring.
pub struct AnchorService {
    storage: Arc<dyn ProvenanceStorage>,
    submission: Arc<SubmissionService>,
    generator: Arc<BatchIdGenerator>,
    clock: Arc<dyn Clock>,
}

impl AnchorService {
    /// Creates the service.
    pub fn new(
        storage: Arc<dyn ProvenanceStorage>,
        submission: Arc<SubmissionService>,
        generator: Arc<BatchIdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, submission, generator, clock }
    }

    /// Registers a product and anchors its claims.
    ///
    /// The product is inserted optimistically under the batch-id uniqueness
    /// constraint; on a collision the id is regenerated and the insert
    /// retried once. Claims are then persisted and their attestations
    /// submitted sequentially, in request order, so the per-product ordering
    /// on the log is deterministic. A submission failure for one claim never
    /// aborts its siblings, and the product row is kept regardless.
    ///
    /// # Errors
    ///
    /// Returns an error only when the product or a claim row itself cannot
    /// be persisted; anchoring failures are reported in the outcome.
    pub async fn register_product(
        &self,
        request: RegisterProductRequest,
    ) -> Result<RegistrationOutcome> {
        let now = self.now();
        let product = self.insert_product(&request, now).await?;

        let mut claims = Vec::with_capacity(request.claims.len());
        for new_claim in &request.claims {
            let claim = Claim::new(
                product.id,
                new_claim.claim_type.clone(),
                new_claim.description.clone(),
                now,
            );
            self.storage.insert_claim(&claim).await?;
            claims.push(claim);
        }

        let product_receipt = self.submit_product_attestation(&product, &claims, now).await;

        let mut claim_outcomes = Vec::with_capacity(claims.len());
        for claim in claims {
            claim_outcomes.push(self.anchor_claim(&product, claim, now).await);
        }

        info!(
            batch_id = %product.batch_id,
            claims = claim_outcomes.len(),
            anchored = claim_outcomes.iter().filter(|o| o.is_anchored()).count(),
            "product registered"
        );

        Ok(RegistrationOutcome { product, product_receipt, claim_outcomes })
    }

    async fn insert_product(
        &self,
        request: &RegisterProductRequest,
        now: DateTime<Utc>,
    ) -> Result<Product> {
        let prefix = BatchIdGenerator::derive_prefix(&request.product_name);
        let store = BatchIdStoreAdapter(self.storage.as_ref());

        let batch_id = self.generator.generate(&store, &prefix).await?;
        let mut product = Product::new(
            batch_id,
            request.product_name.clone(),
            request.supplier_name.clone(),
            request.description.clone(),
            now,
        );

        match self.storage.insert_product(&product).await {
            Ok(_) => Ok(product),
            Err(e) if e.is_conflict() => {
                // Lost the check-then-insert race to a concurrent writer;
                // regenerate under the constraint and retry once.
                warn!(batch_id = %product.batch_id, "batch id collided at insert, regenerating");
                product.batch_id = self.generator.generate(&store, &prefix).await?;
                self.storage.insert_product(&product).await?;
                Ok(product)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn submit_product_attestation(
        &self,
        product: &Product,
        claims: &[Claim],
        now: DateTime<Utc>,
    ) -> Option<SubmissionReceipt> {
        let attestation = Attestation::for_product(product, claims);
        match self.submission.submit_at(&attestation, now).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!(
                    batch_id = %product.batch_id,
                    error = %e,
                    "product attestation submission failed, registration continues"
                );
                None
            },
        }
    }

    /// Anchors one claim: submit, then record the receipt locally.
    ///
    /// The two steps fail independently. A recording failure after a
    /// successful submit leaves an orphan the reconciliation job can repair
    /// from the log; it is reported in the outcome, not retried here.
    async fn anchor_claim(
        &self,
        product: &Product,
        mut claim: Claim,
        now: DateTime<Utc>,
    ) -> ClaimAnchorOutcome {
        let attestation = Attestation::for_claim(&claim, product.batch_id.clone());

        let receipt = match self.submission.submit_at(&attestation, now).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(claim_id = %claim.id, error = %e, "claim attestation submission failed");
                return ClaimAnchorOutcome { claim, receipt: None, error: Some(e.to_string()) };
            },
        };

        match self.storage.record_proof(claim.id, &receipt.transaction_id, None).await {
            Ok(()) => {
                claim.consensus_transaction_id = Some(receipt.transaction_id.clone());
                ClaimAnchorOutcome { claim, receipt: Some(receipt), error: None }
            },
            Err(e) => {
                warn!(
                    claim_id = %claim.id,
                    transaction_id = %receipt.transaction_id,
                    error = %e,
                    "submitted but failed to record transaction id, claim orphaned"
                );
                ClaimAnchorOutcome {
                    claim,
                    receipt: Some(receipt),
                    error: Some(format!("submitted but not recorded locally: {e}")),
                }
            },
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.now_system())
    }
}
