//! Deterministic fake of the consensus network client.
//!
//! Replaces the real, slow, non-deterministic log in tests. Supports
//! scripted records, failure injection for submissions, lookups, and
//! subscriptions, and bookkeeping to assert that every subscription is torn
//! down.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use veritag_consensus::{
    ConsensusError, ConsensusNetwork, ConsensusRecord, Subscription, TransactionStatus,
};
use veritag_core::{TopicId, TransactionId};

/// How injected submission failures present to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The log is unreachable.
    Network,
    /// The topic reference is rejected.
    InvalidTopic,
}

/// A message the fake accepted for submission.
#[derive(Debug, Clone)]
pub struct SubmittedMessage {
    /// Topic the message was sent to.
    pub topic: TopicId,

    /// Raw payload as submitted.
    pub payload: Bytes,

    /// Transaction id the fake minted for it.
    pub transaction_id: TransactionId,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<ConsensusRecord>>,
    submissions: Vec<SubmittedMessage>,
    statuses: HashMap<String, TransactionStatus>,
    fail_all_submissions: Option<FailureMode>,
    fail_submission_numbers: HashMap<usize, FailureMode>,
    fail_transaction_lookups: bool,
    subscription_error_after: Option<(usize, String)>,
    auto_confirm: bool,
    submit_attempts: usize,
    next_sequence: u64,
    next_transaction: u64,
}

/// In-memory consensus network double.
///
/// Transaction ids and sequence numbers are minted deterministically from
/// counters; record timestamps count up from the fake's construction time so
/// they land inside reconciliation windows computed from real clocks.
pub struct FakeConsensusNetwork {
    state: Mutex<State>,
    base_seconds: i64,
    active_subscriptions: Arc<AtomicUsize>,
    root_cancel: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for FakeConsensusNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeConsensusNetwork")
            .field("active_subscriptions", &self.active_subscriptions.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Default for FakeConsensusNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConsensusNetwork {
    /// Creates an empty fake network.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            base_seconds: Utc::now().timestamp(),
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
            root_cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a record to a topic and returns it.
    pub fn publish(
        &self,
        topic: &TopicId,
        payload: Bytes,
        transaction_id: Option<TransactionId>,
    ) -> ConsensusRecord {
        let mut state = self.lock();
        state.next_sequence += 1;
        let sequence = state.next_sequence;

        let record = ConsensusRecord {
            sequence_number: sequence,
            consensus_timestamp: self.timestamp_for(sequence),
            raw_contents: payload,
            transaction_id,
        };

        state.topics.entry(topic.to_string()).or_default().push(record.clone());
        record
    }

    /// Marks a transaction as confirmed with a finality timestamp.
    pub fn confirm_transaction(&self, transaction_id: &TransactionId) {
        let mut state = self.lock();
        state.next_sequence += 1;
        let at = self.timestamp_for(state.next_sequence);
        state.statuses.insert(
            transaction_id.to_string(),
            TransactionStatus { consensus_timestamp: at, result: "SUCCESS".to_string() },
        );
    }

    /// Fails every subsequent submission.
    pub fn fail_all_submissions(&self, mode: FailureMode) {
        self.lock().fail_all_submissions = Some(mode);
    }

    /// Fails the nth submission attempt (1-based), counting failures too.
    pub fn fail_submission_number(&self, attempt: usize, mode: FailureMode) {
        self.lock().fail_submission_numbers.insert(attempt, mode);
    }

    /// Fails every subsequent finality lookup.
    pub fn fail_transaction_lookups(&self) {
        self.lock().fail_transaction_lookups = true;
    }

    /// Makes subsequent subscriptions emit an error after `records` items.
    pub fn fail_subscriptions_after(&self, records: usize, message: &str) {
        self.lock().subscription_error_after = Some((records, message.to_string()));
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_all_submissions = None;
        state.fail_submission_numbers.clear();
        state.fail_transaction_lookups = false;
        state.subscription_error_after = None;
    }

    /// Confirms and publishes every accepted submission immediately.
    ///
    /// Models a log that reaches finality faster than the test re-reads it.
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.lock().auto_confirm = enabled;
    }

    /// Everything accepted for submission so far, in order.
    pub fn submissions(&self) -> Vec<SubmittedMessage> {
        self.lock().submissions.clone()
    }

    /// Number of subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::Acquire)
    }

    /// Yields until all subscriptions have torn down.
    ///
    /// Cancellation is observed by a spawned task, so the count drops one
    /// scheduler turn after a subscription closes.
    pub async fn wait_until_idle(&self) {
        for _ in 0..64 {
            if self.active_subscriptions() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "{} subscription(s) still open after teardown window",
            self.active_subscriptions()
        );
    }

    fn timestamp_for(&self, sequence: u64) -> DateTime<Utc> {
        let seconds = self.base_seconds + i64::try_from(sequence).unwrap_or(0);
        Utc.timestamp_opt(seconds, 0).single().unwrap_or_else(Utc::now)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn mint_transaction_id(state: &mut State, base_seconds: i64) -> TransactionId {
        state.next_transaction += 1;
        let id = format!("0.0.9001@{base_seconds}.{:09}", state.next_transaction);
        TransactionId::parse(&id).expect("fake transaction id is well-formed")
    }
}

#[async_trait::async_trait]
impl ConsensusNetwork for FakeConsensusNetwork {
    async fn submit_message(
        &self,
        topic: &TopicId,
        payload: Bytes,
    ) -> veritag_consensus::Result<TransactionId> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsensusError::network("fake network is closed"));
        }

        let mut state = self.lock();
        state.submit_attempts += 1;

        let attempt = state.submit_attempts;
        let mode =
            state.fail_all_submissions.or_else(|| state.fail_submission_numbers.get(&attempt).copied());
        if let Some(mode) = mode {
            return Err(match mode {
                FailureMode::Network => ConsensusError::network("injected submission failure"),
                FailureMode::InvalidTopic => ConsensusError::invalid_topic(topic.to_string()),
            });
        }

        let transaction_id = Self::mint_transaction_id(&mut state, self.base_seconds);
        state.submissions.push(SubmittedMessage {
            topic: topic.clone(),
            payload: payload.clone(),
            transaction_id: transaction_id.clone(),
        });

        if state.auto_confirm {
            state.next_sequence += 1;
            let sequence = state.next_sequence;
            let at = self.timestamp_for(sequence);
            state.statuses.insert(
                transaction_id.to_string(),
                TransactionStatus { consensus_timestamp: at, result: "SUCCESS".to_string() },
            );
            state.topics.entry(topic.to_string()).or_default().push(ConsensusRecord {
                sequence_number: sequence,
                consensus_timestamp: at,
                raw_contents: payload,
                transaction_id: Some(transaction_id.clone()),
            });
        }

        Ok(transaction_id)
    }

    async fn subscribe(
        &self,
        topic: &TopicId,
        start_time: DateTime<Utc>,
    ) -> veritag_consensus::Result<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsensusError::network("fake network is closed"));
        }

        let (snapshot, error_after) = {
            let state = self.lock();
            let records: Vec<ConsensusRecord> = state
                .topics
                .get(&topic.to_string())
                .map(|records| {
                    records
                        .iter()
                        .filter(|r| r.consensus_timestamp >= start_time)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            (records, state.subscription_error_after.clone())
        };

        let cancel = self.root_cancel.child_token();
        let (sender, receiver) = mpsc::channel(snapshot.len() + 2);

        let mut errored = false;
        for (index, record) in snapshot.into_iter().enumerate() {
            if let Some((after, message)) = &error_after {
                if index >= *after {
                    let _ = sender.try_send(Err(ConsensusError::subscription(message.clone())));
                    errored = true;
                    break;
                }
            }
            let _ = sender.try_send(Ok(record));
        }
        if !errored {
            if let Some((_, message)) = &error_after {
                // Error position beyond the snapshot still ends the stream.
                let _ = sender.try_send(Err(ConsensusError::subscription(message.clone())));
                errored = true;
            }
        }

        if !errored {
            // Keep the stream open until unsubscribed so no-match searches
            // exercise their timeout path instead of seeing stream end.
            self.active_subscriptions.fetch_add(1, Ordering::AcqRel);
            let active = self.active_subscriptions.clone();
            let task_cancel = cancel.clone();
            tokio::spawn(async move {
                task_cancel.cancelled().await;
                drop(sender);
                active.fetch_sub(1, Ordering::AcqRel);
            });
        }

        Ok(Subscription::new(receiver, cancel))
    }

    async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> veritag_consensus::Result<Option<TransactionStatus>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsensusError::network("fake network is closed"));
        }

        let state = self.lock();
        if state.fail_transaction_lookups {
            return Err(ConsensusError::network("injected lookup failure"));
        }

        Ok(state.statuses.get(&transaction_id.to_string()).cloned())
    }

    async fn close(&self) -> veritag_consensus::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.root_cancel.cancel();
        Ok(())
    }
}
