//! Attestation submission to the consensus log.
//!
//! Submission resolves on network acknowledgement, not finality, and is
//! at-most-once: nothing here retries, because a retry would mint a second,
//! distinct transaction id for the same content. Persisting the returned
//! receipt onto the owning claim is the caller's separate step, so the two
//! halves can be retried (or reconciled) independently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use veritag_core::{TopicId, TransactionId};

use crate::{
    attestation::Attestation,
    client::ConsensusNetwork,
    error::{ConsensusError, Result},
};

/// Message size ceiling enforced before any network I/O, in bytes.
///
/// Matches the log's per-message limit. Oversized attestations fail fast
/// with `PayloadTooLarge`; they are never truncated.
pub const MAX_MESSAGE_BYTES: usize = 6144;

/// Receipt returned by a successful submission.
///
/// Holds everything the caller needs to persist proof onto the owning claim
/// and to build evidence links later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Transaction id acknowledged by the network.
    pub transaction_id: TransactionId,

    /// Topic the attestation was sent to.
    pub topic_id: TopicId,

    /// Hex SHA-256 content hash embedded in the message.
    pub claim_hash: String,
}

/// Submits attestations to a fixed log topic.
#[derive(Debug)]
pub struct SubmissionService {
    network: Arc<dyn ConsensusNetwork>,
    topic: TopicId,
}

impl SubmissionService {
    /// Creates a submission service bound to a topic.
    pub fn new(network: Arc<dyn ConsensusNetwork>, topic: TopicId) -> Self {
        Self { network, topic }
    }

    /// Returns the topic this service submits to.
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    /// Submits one attestation and returns its receipt.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` before any network I/O for oversized
    /// messages, `NetworkUnavailable` when the log cannot be reached, or
    /// `InvalidTopic` for a bad topic reference.
    pub async fn submit(&self, attestation: &Attestation) -> Result<SubmissionReceipt> {
        self.submit_at(attestation, Utc::now()).await
    }

    /// Submits with an explicit submission timestamp.
    ///
    /// The timestamp only fills the wire envelope; it does not participate
    /// in the content hash.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SubmissionService::submit`].
    pub async fn submit_at(
        &self,
        attestation: &Attestation,
        submitted_at: DateTime<Utc>,
    ) -> Result<SubmissionReceipt> {
        let message = attestation.to_message(submitted_at)?;
        let payload = message.encode()?;

        if payload.len() > MAX_MESSAGE_BYTES {
            return Err(ConsensusError::payload_too_large(payload.len(), MAX_MESSAGE_BYTES));
        }

        let transaction_id = self.network.submit_message(&self.topic, payload).await?;

        info!(
            topic = %self.topic,
            %transaction_id,
            hash = %message.verification_hash,
            "attestation acknowledged by consensus log"
        );

        Ok(SubmissionReceipt {
            transaction_id,
            topic_id: self.topic.clone(),
            claim_hash: message.verification_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use veritag_core::{BatchId, Claim, ProductId};

    use super::*;

    #[test]
    fn oversized_claim_text_exceeds_ceiling() {
        // Sanity-check the ceiling against a realistic worst case: a claim
        // description has to be pathological before it trips the limit.
        let claim = Claim::new(
            ProductId::new(),
            "organic".into(),
            "x".repeat(MAX_MESSAGE_BYTES),
            Utc::now(),
        );
        let attestation =
            Attestation::for_claim(&claim, BatchId::parse("COFFEE-2026-0042").unwrap());

        let encoded = attestation.to_message(Utc::now()).unwrap().encode().unwrap();
        assert!(encoded.len() > MAX_MESSAGE_BYTES);
    }
}
