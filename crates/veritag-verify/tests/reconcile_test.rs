//! Reconciliation of orphaned claims against fakes.
//!
//! Exercises the repair path for the known gap between "submitted" and
//! "locally recorded": content-hash search over the log, write-once repair,
//! and the guarantees that reconciliation never resubmits and that
//! cancellation is surfaced distinctly.

use test_harness::{fixtures, TestEnv};
use tokio_util::sync::CancellationToken;
use veritag_consensus::ConsensusError;
use veritag_verify::{EngineError, ProvenanceStorage, ReconcileConfig};

#[tokio::test]
async fn repairs_orphaned_claim_from_log_records() {
    let env = TestEnv::new();
    // Confirmed submissions land on the fake topic with transaction ids.
    env.network.set_auto_confirm(true);
    // Submission succeeds, local recording fails: the orphan case.
    env.storage.fail_record_proof(true);

    let outcome = env
        .anchor_service()
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[("organic", "certified organic")],
        ))
        .await
        .unwrap();

    let orphan = &outcome.claim_outcomes[0];
    let receipt = orphan.receipt.as_ref().expect("submission succeeded");
    assert!(env.storage.claim(orphan.claim.id).unwrap().consensus_transaction_id.is_none());

    // The outage ends; reconciliation repairs the missing half.
    env.storage.fail_record_proof(false);
    let submissions_before = env.network.submissions().len();

    let job = env.reconciliation_job(ReconcileConfig::default());
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.examined, 1);
    assert_eq!(summary.repaired, 1);
    assert_eq!(summary.unmatched, 0);

    let repaired = env.storage.claim(orphan.claim.id).unwrap();
    assert_eq!(repaired.consensus_transaction_id.as_ref(), Some(&receipt.transaction_id));
    assert!(repaired.consensus_timestamp.is_some(), "finality timestamp recorded from the log");

    // Repair reads the log; it never mints a second transaction.
    assert_eq!(env.network.submissions().len(), submissions_before);
    env.network.wait_until_idle().await;
}

#[tokio::test]
async fn repairs_claim_from_directly_seeded_record() {
    let env = TestEnv::new();
    let product = fixtures::product("COFFEE-2026-0042");
    env.storage_handle().insert_product(&product).await.unwrap();
    let claim = fixtures::claim(product.id, "organic", "certified organic");
    env.storage_handle().insert_claim(&claim).await.unwrap();

    // The attestation reached the log in some earlier life of the process;
    // only the local half is missing.
    let tx = fixtures::transaction_id(42);
    env.network.publish(
        &env.topic,
        fixtures::claim_attestation_payload(&claim, &product.batch_id),
        Some(tx.clone()),
    );

    let job = env.reconciliation_job(ReconcileConfig::default());
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.repaired, 1);
    assert_eq!(env.storage.claim(claim.id).unwrap().consensus_transaction_id, Some(tx));
}

#[tokio::test]
async fn claim_without_log_record_stays_unmatched() {
    let env = TestEnv::new();
    let product = fixtures::product("COFFEE-2026-0042");
    env.storage_handle().insert_product(&product).await.unwrap();
    let claim = fixtures::claim(product.id, "organic", "never submitted");
    env.storage_handle().insert_claim(&claim).await.unwrap();

    let job = env.reconciliation_job(ReconcileConfig::default());
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.examined, 1);
    assert_eq!(summary.repaired, 0);
    assert_eq!(summary.unmatched, 1);
    assert!(env.storage.claim(claim.id).unwrap().consensus_transaction_id.is_none());
}

#[tokio::test]
async fn nothing_to_reconcile_is_a_clean_run() {
    let env = TestEnv::new();
    env.network.set_auto_confirm(true);

    env.anchor_service()
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[("organic", "certified organic")],
        ))
        .await
        .unwrap();

    let job = env.reconciliation_job(ReconcileConfig::default());
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.examined, 0);
    assert_eq!(summary.repaired, 0);
}

#[tokio::test]
async fn cancellation_aborts_the_run_distinctly() {
    let env = TestEnv::new();
    let product = fixtures::product("COFFEE-2026-0042");
    env.storage_handle().insert_product(&product).await.unwrap();
    let claim = fixtures::claim(product.id, "organic", "pending repair");
    env.storage_handle().insert_claim(&claim).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let job = env.reconciliation_job(ReconcileConfig::default());
    let result = job.run_once(&cancel).await;

    assert!(matches!(result, Err(EngineError::Consensus(ConsensusError::Cancelled))));
    env.network.wait_until_idle().await;
}
