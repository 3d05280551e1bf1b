//! Confirmation queries against the consensus log.
//!
//! Two read paths: point lookups of a single transaction's finality, and
//! content searches over a bounded per-topic subscription. A search resolves
//! exactly once, on first match (after a short grace period for
//! near-simultaneous duplicates), on timeout, on subscription error, or on
//! caller cancellation; whichever way it resolves, the subscription is torn
//! down before returning.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use veritag_core::{Clock, TopicId, TransactionId};

use crate::{
    client::{ConsensusNetwork, ConsensusRecord, Subscription},
    error::{ConsensusError, Result},
};

/// Configuration for query behavior.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long a content search waits before returning what it has.
    pub wait_timeout: Duration,

    /// Grace period after a first match for near-simultaneous duplicates.
    pub match_grace: Duration,

    /// How long a verification result may be served from cache.
    ///
    /// Performance optimization only; confirmation state changes over time,
    /// so reports are still computed fresh per request.
    pub verify_cache_ttl: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(10),
            match_grace: Duration::from_millis(500),
            verify_cache_ttl: Duration::from_secs(5),
        }
    }
}

/// The bounded window a content search covers.
#[derive(Debug, Clone)]
pub struct QueryWindow {
    /// Earliest consensus timestamp of interest.
    pub start: DateTime<Utc>,

    /// Wait override; `None` uses the configured default.
    pub timeout: Option<Duration>,
}

impl QueryWindow {
    /// Creates a window starting at the given time with the default wait.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, timeout: None }
    }

    /// Overrides the wait timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a single-transaction finality lookup.
#[derive(Debug, Clone)]
pub struct TransactionVerification {
    /// Whether the log has a confirmed record of the transaction.
    ///
    /// `false` immediately after submission is expected, not an error: the
    /// log confirms minutes after acknowledgement.
    pub exists: bool,

    /// Finality timestamp, when confirmed.
    pub consensus_timestamp: Option<DateTime<Utc>>,

    /// Network result code, when confirmed.
    pub result: Option<String>,
}

struct CacheEntry {
    at: Instant,
    verification: TransactionVerification,
}

/// Verifier over the consensus log.
pub struct ConsensusVerifier {
    network: Arc<dyn ConsensusNetwork>,
    config: QueryConfig,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for ConsensusVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusVerifier").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ConsensusVerifier {
    /// Creates a verifier.
    pub fn new(network: Arc<dyn ConsensusNetwork>, config: QueryConfig, clock: Arc<dyn Clock>) -> Self {
        Self { network, config, clock, cache: Mutex::new(HashMap::new()) }
    }

    /// Looks up finality for a single transaction.
    ///
    /// Results may be served from a short-lived cache; a network failure is
    /// returned as an error, never as `exists: false`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkUnavailable` or `Timeout` when the lookup fails.
    pub async fn verify_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionVerification> {
        let key = transaction_id.to_string();

        if let Some(cached) = self.cached(&key) {
            debug!(%transaction_id, "serving verification from cache");
            return Ok(cached);
        }

        let verification = match self.network.transaction_status(transaction_id).await? {
            Some(status) => TransactionVerification {
                exists: true,
                consensus_timestamp: Some(status.consensus_timestamp),
                result: Some(status.result),
            },
            None => {
                TransactionVerification { exists: false, consensus_timestamp: None, result: None }
            },
        };

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, CacheEntry { at: self.clock.now(), verification: verification.clone() });

        Ok(verification)
    }

    /// Searches a topic for records matching a predicate.
    ///
    /// Opens a subscription bounded by the window: resolves on first match
    /// after the duplicate grace period, on timeout with whatever was
    /// collected, or on subscription error with partial results. Caller
    /// cancellation unsubscribes immediately and returns
    /// `ConsensusError::Cancelled`, never an empty result.
    ///
    /// # Errors
    ///
    /// Returns `NetworkUnavailable` if the subscription cannot be opened,
    /// `Cancelled` on caller cancellation.
    pub async fn query_by_content<P>(
        &self,
        topic: &TopicId,
        predicate: P,
        window: QueryWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConsensusRecord>>
    where
        P: Fn(&ConsensusRecord) -> bool + Send + Sync,
    {
        let timeout = window.timeout.unwrap_or(self.config.wait_timeout);
        let mut subscription = self.network.subscribe(topic, window.start).await?;
        let mut matched = Vec::new();

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                subscription.close();
                return Err(ConsensusError::Cancelled);
            },
            () = Self::collect_until_resolved(
                &mut subscription,
                &predicate,
                &self.clock,
                self.config.match_grace,
                &mut matched,
            ) => {},
            () = self.clock.sleep(timeout) => {
                debug!(%topic, matched = matched.len(), "content search hit wait timeout");
            },
        }

        subscription.close();
        Ok(matched)
    }

    /// Drains the subscription until the search resolves.
    ///
    /// Returns after the first match plus its grace period, on stream end,
    /// or on stream error; the timeout and cancellation arms live in the
    /// caller's select.
    async fn collect_until_resolved<P>(
        subscription: &mut Subscription,
        predicate: &P,
        clock: &Arc<dyn Clock>,
        grace_period: Duration,
        matched: &mut Vec<ConsensusRecord>,
    ) where
        P: Fn(&ConsensusRecord) -> bool + Send + Sync,
    {
        loop {
            match subscription.recv().await {
                Some(Ok(record)) => {
                    if predicate(&record) {
                        matched.push(record);
                        break;
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, "subscription failed, returning partial results");
                    return;
                },
                None => return,
            }
        }

        let grace = clock.sleep(grace_period);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                biased;

                message = subscription.recv() => match message {
                    Some(Ok(record)) => {
                        if predicate(&record) {
                            matched.push(record);
                        }
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "subscription failed during duplicate grace period");
                        return;
                    },
                    None => return,
                },
                () = &mut grace => return,
            }
        }
    }

    fn cached(&self, key: &str) -> Option<TransactionVerification> {
        if self.config.verify_cache_ttl.is_zero() {
            return None;
        }

        let cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = cache.get(key)?;
        let fresh = self.clock.now().duration_since(entry.at) < self.config.verify_cache_ttl;
        fresh.then(|| entry.verification.clone())
    }
}
