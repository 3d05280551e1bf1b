//! Product verification against the consensus log.
//!
//! Loads a product and its claims from the store, checks each persisted
//! transaction id for finality, and folds the results into a verification
//! report. Reports are computed fresh per request; only the individual
//! finality lookups may be served from the verifier's short-lived cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use veritag_consensus::{ConsensusVerifier, Network, ProofLinks};
use veritag_core::{BatchId, Claim, Clock, CoreError, TopicId};

use crate::{
    aggregator::{compute_report, ClaimProofState, ClassifiedClaim, VerificationReport},
    error::Result,
    storage::ProvenanceStorage,
};

/// Service computing verification reports.
pub struct VerificationService {
    storage: Arc<dyn ProvenanceStorage>,
    verifier: Arc<ConsensusVerifier>,
    topic: TopicId,
    network: Network,
    clock: Arc<dyn Clock>,
}

impl VerificationService {
    /// Creates the service.
    pub fn new(
        storage: Arc<dyn ProvenanceStorage>,
        verifier: Arc<ConsensusVerifier>,
        topic: TopicId,
        network: Network,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, verifier, topic, network, clock }
    }

    /// Verifies a product's claims and returns the report.
    ///
    /// Claims are checked sequentially in creation order. A claim whose
    /// finality lookup fails transiently is classified as pending, never as
    /// a confirmed negative, and never aborts its siblings.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown batch id, or a storage
    /// error if the product and claims cannot be loaded.
    pub async fn verify_product(&self, batch_id: &BatchId) -> Result<VerificationReport> {
        let product = self
            .storage
            .find_product_by_batch_id(batch_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("no product with batch id {batch_id}")))?;

        let claims = self.storage.find_claims(product.id).await?;

        let mut classified = Vec::with_capacity(claims.len());
        for claim in &claims {
            classified.push(self.classify_claim(claim).await);
        }

        let report = compute_report(product.batch_id.clone(), classified, self.now());
        debug!(
            %batch_id,
            status = %report.overall_status,
            verified = report.verified_claims,
            total = report.total_claims,
            "verification report computed"
        );

        Ok(report)
    }

    async fn classify_claim(&self, claim: &Claim) -> ClassifiedClaim {
        let mut classified = ClassifiedClaim {
            claim_id: claim.id,
            claim_type: claim.claim_type.clone(),
            state: ClaimProofState::NoProof,
            transaction_id: claim.consensus_transaction_id.clone(),
            consensus_timestamp: None,
            proof_links: None,
        };

        let Some(transaction_id) = &claim.consensus_transaction_id else {
            return classified;
        };

        match self.verifier.verify_transaction(transaction_id).await {
            Ok(verification) if verification.exists => {
                classified.state = ClaimProofState::Confirmed;
                classified.consensus_timestamp = verification.consensus_timestamp;
                classified.proof_links =
                    Some(ProofLinks::for_ids(transaction_id, &self.topic, self.network));
            },
            Ok(_) => {
                // The log has not confirmed the message yet; expected for
                // recent submissions.
                classified.state = ClaimProofState::ProofPendingConfirmation;
            },
            Err(e) => {
                warn!(
                    claim_id = %claim.id,
                    %transaction_id,
                    error = %e,
                    "finality lookup failed, classifying claim as pending"
                );
                classified.state = ClaimProofState::ProofPendingConfirmation;
            },
        }

        classified
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.now_system())
    }
}
