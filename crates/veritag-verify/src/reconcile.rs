//! Reconciliation of orphaned claims.
//!
//! Submission and local recording are two independent steps with no shared
//! transaction: a crash between them leaves a claim whose attestation is on
//! the log but whose transaction id was never persisted. This job repairs
//! exactly that missing half. It rebuilds each unanchored claim's content
//! hash from stored fields, searches the topic for a record embedding that
//! hash, and records the found transaction id. It never resubmits: a second
//! submission would mint a second transaction id, not repair the first.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veritag_core::{storage::claims::UnanchoredClaim, Clock, TopicId};
use veritag_consensus::{
    AttestationMessage, Attestation, ConsensusError, ConsensusRecord, ConsensusVerifier,
    QueryWindow,
};

use crate::{error::Result, storage::ProvenanceStorage};

/// Configuration for the reconciliation job.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Maximum unanchored claims examined per run.
    pub batch_limit: i64,

    /// Slack subtracted from a claim's creation time when opening the
    /// search window, covering clock skew between store and log.
    pub window_slack: Duration,

    /// Wait timeout per content search.
    pub search_timeout: Duration,

    /// Pause between runs when driven by [`ReconciliationJob::run`].
    pub interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            window_slack: Duration::from_secs(60),
            search_timeout: Duration::from_secs(10),
            interval: Duration::from_secs(300),
        }
    }
}

/// Counters from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    /// Unanchored claims examined.
    pub examined: usize,

    /// Claims repaired by recording a found transaction id.
    pub repaired: usize,

    /// Claims with no matching record in the window.
    ///
    /// Includes matches whose records do not expose a transaction id; those
    /// cannot be repaired from the log alone.
    pub unmatched: usize,

    /// Claims skipped because the search or the recording step failed.
    pub failed: usize,
}

/// Background job repairing the submitted-but-not-recorded gap.
pub struct ReconciliationJob {
    storage: Arc<dyn ProvenanceStorage>,
    verifier: Arc<ConsensusVerifier>,
    topic: TopicId,
    config: ReconcileConfig,
    clock: Arc<dyn Clock>,
}

impl ReconciliationJob {
    /// Creates the job.
    pub fn new(
        storage: Arc<dyn ProvenanceStorage>,
        verifier: Arc<ConsensusVerifier>,
        topic: TopicId,
        config: ReconcileConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, verifier, topic, config, clock }
    }

    /// Runs reconciliation until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(topic = %self.topic, interval = ?self.config.interval, "reconciliation job started");

        loop {
            match self.run_once(&cancel).await {
                Ok(summary) if summary.examined > 0 => {
                    info!(
                        examined = summary.examined,
                        repaired = summary.repaired,
                        unmatched = summary.unmatched,
                        failed = summary.failed,
                        "reconciliation run complete"
                    );
                },
                Ok(_) => {},
                Err(e) => warn!(error = %e, "reconciliation run failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.config.interval) => {},
            }
        }

        info!("reconciliation job stopped");
    }

    /// Examines one batch of unanchored claims and repairs what it can.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the unanchored batch cannot be loaded, or
    /// `ConsensusError::Cancelled` if the caller cancelled mid-run.
    /// Per-claim search and recording failures are counted, not propagated.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<ReconciliationSummary> {
        let unanchored = self.storage.find_unanchored_claims(self.config.batch_limit).await?;
        let mut summary = ReconciliationSummary { examined: unanchored.len(), ..Default::default() };

        for orphan in unanchored {
            match self.repair(&orphan, cancel).await {
                Ok(true) => summary.repaired += 1,
                Ok(false) => summary.unmatched += 1,
                Err(e) if matches!(e, crate::EngineError::Consensus(ConsensusError::Cancelled)) => {
                    return Err(e);
                },
                Err(e) => {
                    warn!(claim_id = %orphan.claim.id, error = %e, "claim reconciliation failed");
                    summary.failed += 1;
                },
            }
        }

        Ok(summary)
    }

    /// Repairs one orphan; returns whether a transaction id was recorded.
    async fn repair(&self, orphan: &UnanchoredClaim, cancel: &CancellationToken) -> Result<bool> {
        let attestation = Attestation::for_claim(&orphan.claim, orphan.batch_id.clone());
        let hash = attestation.content_hash()?;

        let start = DateTime::<Utc>::from(
            std::time::SystemTime::from(orphan.claim.created_at) - self.config.window_slack,
        );
        let window = QueryWindow::starting_at(start).with_timeout(self.config.search_timeout);

        let records = self
            .verifier
            .query_by_content(
                &self.topic,
                move |record| record_embeds_hash(record, &hash),
                window,
                cancel,
            )
            .await?;

        let found = records
            .iter()
            .find_map(|r| r.transaction_id.clone().map(|tx| (tx, r.consensus_timestamp)));

        let Some((transaction_id, consensus_timestamp)) = found else {
            if !records.is_empty() {
                debug!(
                    claim_id = %orphan.claim.id,
                    "matching records found but none exposes a transaction id"
                );
            }
            return Ok(false);
        };

        self.storage
            .record_proof(orphan.claim.id, &transaction_id, Some(consensus_timestamp))
            .await?;

        info!(
            claim_id = %orphan.claim.id,
            %transaction_id,
            "orphaned claim repaired from consensus log"
        );

        Ok(true)
    }
}

/// Whether a record's payload is an attestation embedding the given hash.
fn record_embeds_hash(record: &ConsensusRecord, hash: &str) -> bool {
    AttestationMessage::decode(&record.raw_contents)
        .map(|message| message.verification_hash == hash)
        .unwrap_or(false)
}
