//! Product registration and claim anchoring against fakes.
//!
//! Exercises the write path end to end: batch-id assignment under the
//! uniqueness constraint, sequential per-product submission order, per-claim
//! failure isolation, fail-fast payload limits, and the orphan case where
//! submission succeeds but local recording does not.

use test_harness::{fixtures, FailureMode, TestEnv};
use veritag_consensus::{AttestationKind, AttestationMessage, MAX_MESSAGE_BYTES};
use veritag_core::{BatchId, CoreError};
use veritag_verify::EngineError;

#[tokio::test]
async fn registration_anchors_all_claims_in_order() {
    let env = TestEnv::new();
    let service = env.anchor_service();

    let outcome = service
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[("organic", "certified organic"), ("fair-trade", "fair trade sourcing")],
        ))
        .await
        .unwrap();

    assert_eq!(outcome.product.batch_id.prefix(), "COFFEE");
    assert!(outcome.product_receipt.is_some());
    assert_eq!(outcome.claim_outcomes.len(), 2);
    assert_eq!(outcome.anchored_claims(), 2);

    // Transaction ids are persisted onto the owning claims.
    for claim_outcome in &outcome.claim_outcomes {
        let stored = env.storage.claim(claim_outcome.claim.id).unwrap();
        assert_eq!(
            stored.consensus_transaction_id,
            claim_outcome.receipt.as_ref().map(|r| r.transaction_id.clone())
        );
    }

    // One product attestation first, then claims in request order.
    let submissions = env.network.submissions();
    assert_eq!(submissions.len(), 3);

    let first = AttestationMessage::decode(&submissions[0].payload).unwrap();
    assert_eq!(first.kind, AttestationKind::Product);

    for (submission, expected_type) in submissions[1..].iter().zip(["organic", "fair-trade"]) {
        let message = AttestationMessage::decode(&submission.payload).unwrap();
        assert_eq!(message.kind, AttestationKind::Claim);
        let veritag_consensus::attestation::AttestationData::Claim(data) = message.data else {
            panic!("claim submission decoded as product");
        };
        assert_eq!(data.claim_type, expected_type);
    }

    // Distinct transactions for distinct submissions.
    assert_ne!(submissions[1].transaction_id, submissions[2].transaction_id);
}

#[tokio::test]
async fn failed_submission_does_not_abort_siblings() {
    let env = TestEnv::new();
    // Submission order: 1 product attestation, then one per claim.
    env.network.fail_submission_number(3, FailureMode::Network);

    let service = env.anchor_service();
    let outcome = service
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[
                ("organic", "certified organic"),
                ("audit", "third party audited"),
                ("origin", "single origin"),
            ],
        ))
        .await
        .unwrap();

    // The product row and every claim row exist regardless.
    assert_eq!(env.storage.products().len(), 1);
    assert_eq!(outcome.claim_outcomes.len(), 3);

    let failed = &outcome.claim_outcomes[1];
    assert!(!failed.is_anchored());
    assert!(failed.receipt.is_none());
    assert!(failed.error.as_deref().unwrap_or_default().contains("unavailable"));
    assert!(env.storage.claim(failed.claim.id).unwrap().consensus_transaction_id.is_none());

    for anchored in [&outcome.claim_outcomes[0], &outcome.claim_outcomes[2]] {
        assert!(anchored.is_anchored(), "sibling claims must anchor independently");
        assert!(env.storage.claim(anchored.claim.id).unwrap().consensus_transaction_id.is_some());
    }
}

#[tokio::test]
async fn batch_id_collision_retries_exactly_once() {
    let env = TestEnv::new();
    env.storage.inject_insert_conflicts(1);

    let service = env.anchor_service();
    let outcome =
        service.register_product(fixtures::register_request("Coffee Beans", &[])).await.unwrap();

    // Second attempt landed under a regenerated, still well-formed id.
    assert!(BatchId::parse(outcome.product.batch_id.as_str()).is_ok());
    assert_eq!(env.storage.products().len(), 1);
}

#[tokio::test]
async fn persistent_collision_surfaces_conflict() {
    let env = TestEnv::new();
    env.storage.inject_insert_conflicts(2);

    let service = env.anchor_service();
    let result = service.register_product(fixtures::register_request("Coffee Beans", &[])).await;

    assert!(
        matches!(result, Err(EngineError::Core(CoreError::Conflict(_)))),
        "one regeneration retry, then the conflict propagates"
    );
}

#[tokio::test]
async fn oversized_attestation_fails_fast() {
    let env = TestEnv::new();
    let service = env.anchor_service();

    let outcome = service
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[
                ("organic", "certified organic"),
                ("provenance", &"x".repeat(MAX_MESSAGE_BYTES)),
            ],
        ))
        .await
        .unwrap();

    let oversized = &outcome.claim_outcomes[1];
    assert!(oversized.receipt.is_none());
    assert!(oversized.error.as_deref().unwrap_or_default().contains("message ceiling"));

    // The oversized message never reached the network; the small sibling did.
    let claim_submissions = env
        .network
        .submissions()
        .iter()
        .filter(|s| {
            matches!(
                AttestationMessage::decode(&s.payload).map(|m| m.kind),
                Ok(AttestationKind::Claim)
            )
        })
        .count();
    assert_eq!(claim_submissions, 1);
    assert!(outcome.claim_outcomes[0].is_anchored());
}

#[tokio::test]
async fn recording_failure_leaves_a_repairable_orphan() {
    let env = TestEnv::new();
    env.storage.fail_record_proof(true);

    let service = env.anchor_service();
    let outcome = service
        .register_product(fixtures::register_request(
            "Coffee Beans",
            &[("organic", "certified organic")],
        ))
        .await
        .unwrap();

    let orphan = &outcome.claim_outcomes[0];
    assert!(orphan.receipt.is_some(), "the log acknowledged the attestation");
    assert!(orphan.error.as_deref().unwrap_or_default().contains("not recorded locally"));
    assert!(!orphan.is_anchored());

    // The claim row exists without a transaction id: reconciliation's input.
    let stored = env.storage.claim(orphan.claim.id).unwrap();
    assert!(stored.consensus_transaction_id.is_none());
}
