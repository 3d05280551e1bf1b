//! Fixture builders for anchoring and verification tests.

use bytes::Bytes;
use chrono::Utc;
use veritag_consensus::Attestation;
use veritag_core::{BatchId, Claim, Product, ProductId, TopicId, TransactionId};
use veritag_verify::{NewClaim, RegisterProductRequest};

/// Topic used throughout the test suite.
pub fn test_topic() -> TopicId {
    TopicId::parse("0.0.48211").expect("fixture topic id is well-formed")
}

/// A deterministic transaction id distinct per `n`.
pub fn transaction_id(n: u64) -> TransactionId {
    TransactionId::parse(&format!("0.0.7001@1700000000.{n:09}"))
        .expect("fixture transaction id is well-formed")
}

/// A registration request with the given claim type/description pairs.
pub fn register_request(product_name: &str, claims: &[(&str, &str)]) -> RegisterProductRequest {
    RegisterProductRequest {
        product_name: product_name.to_string(),
        supplier_name: "Highland Farms".to_string(),
        description: Some("grown above 1500m".to_string()),
        claims: claims
            .iter()
            .map(|(claim_type, description)| NewClaim {
                claim_type: (*claim_type).to_string(),
                description: (*description).to_string(),
            })
            .collect(),
    }
}

/// A product row with a parsed batch id.
pub fn product(batch_id: &str) -> Product {
    Product::new(
        BatchId::parse(batch_id).expect("fixture batch id is well-formed"),
        "Coffee Beans".to_string(),
        "Highland Farms".to_string(),
        None,
        Utc::now(),
    )
}

/// A claim row belonging to the given product.
pub fn claim(product_id: ProductId, claim_type: &str, description: &str) -> Claim {
    Claim::new(product_id, claim_type.to_string(), description.to_string(), Utc::now())
}

/// The encoded wire message a claim's attestation would produce.
///
/// Useful for seeding the fake log with records that reconciliation can
/// match by content hash.
pub fn claim_attestation_payload(claim: &Claim, batch_id: &BatchId) -> Bytes {
    Attestation::for_claim(claim, batch_id.clone())
        .to_message(Utc::now())
        .and_then(|message| message.encode())
        .expect("fixture attestation encodes")
}
