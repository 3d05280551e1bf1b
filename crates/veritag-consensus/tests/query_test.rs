//! Query and verification behavior against the fake consensus network.
//!
//! Covers the bounded-subscription contract: resolution on first match with
//! a duplicate grace period, timeout with collected results, partial results
//! on subscription error, distinct cancellation, and teardown on every exit
//! path.

use std::time::Duration;

use bytes::Bytes;
use test_harness::{FakeConsensusNetwork, TestEnv};
use tokio_util::sync::CancellationToken;
use veritag_consensus::{
    ConsensusError, ConsensusNetwork, ConsensusRecord, QueryConfig, QueryWindow,
};

fn starts_with(prefix: &'static [u8]) -> impl Fn(&ConsensusRecord) -> bool + Send + Sync {
    move |record: &ConsensusRecord| record.raw_contents.starts_with(prefix)
}

/// A window wide enough to cover everything the fake has published.
fn open_window() -> QueryWindow {
    QueryWindow::starting_at(chrono::Utc::now() - chrono::Duration::hours(1))
}

#[tokio::test]
async fn first_match_collects_near_simultaneous_duplicates() {
    let env = TestEnv::new();
    env.network.publish(&env.topic, Bytes::from_static(b"match:a"), None);
    env.network.publish(&env.topic, Bytes::from_static(b"match:b"), None);
    env.network.publish(&env.topic, Bytes::from_static(b"other"), None);

    let verifier = env.verifier();
    let records = verifier
        .query_by_content(&env.topic, starts_with(b"match:"), open_window(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 2, "duplicate inside grace period should be collected");
    assert!(records[0].sequence_number < records[1].sequence_number, "order preserved");

    env.network.wait_until_idle().await;
}

#[tokio::test]
async fn no_match_returns_empty_after_timeout() {
    let env = TestEnv::new();
    env.network.publish(&env.topic, Bytes::from_static(b"other"), None);

    let verifier = env.verifier();
    let records = verifier
        .query_by_content(
            &env.topic,
            starts_with(b"match:"),
            open_window().with_timeout(Duration::from_secs(3)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(records.is_empty(), "timeout with no match returns what was collected");
    env.network.wait_until_idle().await;
}

#[tokio::test]
async fn subscription_error_returns_partial_results() {
    let env = TestEnv::new();
    env.network.publish(&env.topic, Bytes::from_static(b"match:a"), None);
    env.network.publish(&env.topic, Bytes::from_static(b"match:b"), None);
    // Stream dies after the first record reaches the caller.
    env.network.fail_subscriptions_after(1, "stream reset");

    let verifier = env.verifier();
    let records = verifier
        .query_by_content(&env.topic, starts_with(b"match:"), open_window(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(records.len(), 1, "error resolves the query with partial results");
    env.network.wait_until_idle().await;
}

#[tokio::test]
async fn cancellation_is_distinct_from_not_found() {
    let env = TestEnv::new();
    env.network.publish(&env.topic, Bytes::from_static(b"match:a"), None);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let verifier = env.verifier();
    let result = verifier
        .query_by_content(&env.topic, starts_with(b"match:"), open_window(), &cancel)
        .await;

    assert!(
        matches!(result, Err(ConsensusError::Cancelled)),
        "cancellation must never masquerade as an empty result"
    );
    env.network.wait_until_idle().await;
}

#[tokio::test]
async fn verification_is_negative_until_the_log_confirms() {
    let env = TestEnv::new();
    let tx = env
        .network
        .submit_message(&env.topic, Bytes::from_static(b"payload"))
        .await
        .unwrap();

    let verifier = env.verifier_with(QueryConfig {
        verify_cache_ttl: Duration::ZERO,
        ..QueryConfig::default()
    });

    // Acknowledged but not yet final: a legitimate negative, not an error.
    let pending = verifier.verify_transaction(&tx).await.unwrap();
    assert!(!pending.exists);
    assert!(pending.consensus_timestamp.is_none());

    env.network.confirm_transaction(&tx);

    let confirmed = verifier.verify_transaction(&tx).await.unwrap();
    assert!(confirmed.exists);
    assert!(confirmed.consensus_timestamp.is_some());
    assert_eq!(confirmed.result.as_deref(), Some("SUCCESS"));
}

#[tokio::test]
async fn verification_cache_is_bounded_by_ttl() {
    let env = TestEnv::new();
    let tx = env
        .network
        .submit_message(&env.topic, Bytes::from_static(b"payload"))
        .await
        .unwrap();
    env.network.confirm_transaction(&tx);

    let verifier = env.verifier();
    assert!(verifier.verify_transaction(&tx).await.unwrap().exists);

    // Within the TTL the cached answer masks the outage.
    env.network.fail_transaction_lookups();
    assert!(verifier.verify_transaction(&tx).await.unwrap().exists);

    // Past the TTL the lookup failure surfaces as an error, never as a
    // confirmed negative.
    env.clock.advance(Duration::from_secs(6));
    let result = verifier.verify_transaction(&tx).await;
    assert!(matches!(result, Err(ConsensusError::NetworkUnavailable { .. })));
}

#[tokio::test]
async fn lookup_failure_is_an_error_not_a_negative() {
    let env = TestEnv::new();
    env.network.fail_transaction_lookups();

    let verifier = env.verifier();
    let tx = test_harness::fixtures::transaction_id(1);
    let result = verifier.verify_transaction(&tx).await;

    let err = result.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn closed_network_tears_down_open_subscriptions() {
    let env = TestEnv::new();
    let network: &FakeConsensusNetwork = &env.network;

    let _subscription = network.subscribe(&env.topic, chrono::Utc::now()).await.unwrap();
    assert_eq!(network.active_subscriptions(), 1);

    network.close().await.unwrap();
    network.wait_until_idle().await;
}
