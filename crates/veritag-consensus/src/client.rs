//! Consensus network client abstraction.
//!
//! The external log is reached through the [`ConsensusNetwork`] trait so the
//! engine can run against the REST gateway in production and a deterministic
//! fake in tests. The one long-lived handle is constructed explicitly at
//! process start, shared by reference, and closed once at shutdown; there is
//! no ambient global client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use veritag_core::{TopicId, TransactionId};

use crate::error::Result;

/// A record read back from the consensus log.
///
/// Fetched on demand and never owned or cached beyond a request's lifetime.
#[derive(Debug, Clone)]
pub struct ConsensusRecord {
    /// Position within the topic; strictly increasing per subscription.
    pub sequence_number: u64,

    /// Finality timestamp assigned by the log.
    pub consensus_timestamp: DateTime<Utc>,

    /// Raw message contents as submitted.
    pub raw_contents: Bytes,

    /// Originating transaction id, when the log exposes it.
    ///
    /// Reconciliation can only repair a claim from records that carry this.
    pub transaction_id: Option<TransactionId>,
}

/// Finality information for a single transaction.
#[derive(Debug, Clone)]
pub struct TransactionStatus {
    /// When the log reached consensus on the message.
    pub consensus_timestamp: DateTime<Utc>,

    /// Network result code, e.g. `SUCCESS`.
    pub result: String,
}

/// An open per-topic subscription.
///
/// Records arrive in strictly increasing sequence-number order. The
/// subscription is torn down by [`Subscription::close`] or on drop, so every
/// exit path of a query releases its network resources.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Result<ConsensusRecord>>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Creates a subscription from its record channel and cancel handle.
    pub fn new(receiver: mpsc::Receiver<Result<ConsensusRecord>>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Receives the next record, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<ConsensusRecord>> {
        self.receiver.recv().await
    }

    /// Unsubscribes. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Operations the engine needs from the consensus log.
///
/// Implementations must be safe for concurrent use: submissions and queries
/// for unrelated products run fully in parallel over the same handle.
#[async_trait::async_trait]
pub trait ConsensusNetwork: Send + Sync + std::fmt::Debug {
    /// Submits a message to a topic.
    ///
    /// Resolves once the network acknowledges receipt, which is before
    /// finality; the consensus timestamp is usually not yet assigned when
    /// this returns. At-most-once: a caller retry produces a new, distinct
    /// transaction id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTopic` for an unknown topic, `NetworkUnavailable`
    /// when the log cannot be reached.
    async fn submit_message(&self, topic: &TopicId, payload: Bytes) -> Result<TransactionId>;

    /// Opens an ordered subscription over a topic from a start time.
    ///
    /// # Errors
    ///
    /// Returns `NetworkUnavailable` if the subscription cannot be opened.
    async fn subscribe(&self, topic: &TopicId, start_time: DateTime<Utc>) -> Result<Subscription>;

    /// Reads finality information for a single transaction.
    ///
    /// Returns `Ok(None)` when the log has no record of the transaction,
    /// which immediately after submission is the expected answer.
    ///
    /// # Errors
    ///
    /// Returns `NetworkUnavailable` or `Timeout` when the lookup itself
    /// fails; such failures are never reported as a confirmed negative.
    async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransactionStatus>>;

    /// Closes the handle, tearing down any open subscriptions.
    ///
    /// Called exactly once at process shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; the handle is unusable either way.
    async fn close(&self) -> Result<()>;
}
