//! Attestation canonicalization, hashing, and wire format.
//!
//! An attestation is the ephemeral message sent to the consensus log: the
//! canonical content of a product or claim plus an embedded SHA-256 content
//! hash. The hash covers only stored, reproducible fields (claims sorted,
//! fixed key order) so that any party can recompute it later without access
//! to submission-time state, and so that tampering in transit or at rest is
//! detectable without trusting the log's own ordering guarantees.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use veritag_core::{BatchId, Claim, ClaimId, Product};

use crate::error::Result;

/// One claim's content as embedded in a product attestation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimContent {
    /// Claim category.
    pub claim_type: String,

    /// Human-readable claim text.
    pub description: String,
}

impl From<&Claim> for ClaimContent {
    fn from(claim: &Claim) -> Self {
        Self { claim_type: claim.claim_type.clone(), description: claim.description.clone() }
    }
}

/// Product content anchored on the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductData {
    /// Batch identifier of the product.
    pub batch_id: BatchId,

    /// Product name.
    pub product_name: String,

    /// Supplier name.
    pub supplier_name: String,

    /// Optional description; omitted from the wire format when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the product was registered.
    pub created_at: DateTime<Utc>,
}

/// Claim content anchored on the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimData {
    /// Identifier of the claim row.
    pub claim_id: ClaimId,

    /// Batch identifier of the owning product.
    pub product_batch_id: BatchId,

    /// Claim category.
    pub claim_type: String,

    /// Human-readable claim text.
    pub claim_description: String,

    /// When the claim was created.
    pub created_at: DateTime<Utc>,
}

/// An attestation awaiting submission.
///
/// Product attestations carry the product fields plus the full claim set;
/// claim attestations carry a single claim. Both hash to a hex SHA-256 over
/// their canonical byte representation.
#[derive(Debug, Clone)]
pub enum Attestation {
    /// Attestation of a registered product and its claim set.
    Product {
        /// Product content.
        data: ProductData,
        /// Claim set, order-insensitive for hashing.
        claims: Vec<ClaimContent>,
    },

    /// Attestation of a single claim.
    Claim {
        /// Claim content.
        data: ClaimData,
    },
}

/// Canonical product representation with fixed key order and sorted claims.
#[derive(Serialize)]
struct CanonicalProduct<'a> {
    batch_id: &'a str,
    product_name: &'a str,
    supplier_name: &'a str,
    claims: Vec<&'a ClaimContent>,
    timestamp: String,
}

/// Canonical claim representation with fixed key order.
#[derive(Serialize)]
struct CanonicalClaim<'a> {
    claim_id: String,
    product_batch_id: &'a str,
    claim_type: &'a str,
    claim_description: &'a str,
    timestamp: String,
}

impl Attestation {
    /// Builds a product attestation from a product row and its claims.
    pub fn for_product(product: &Product, claims: &[Claim]) -> Self {
        Self::Product {
            data: ProductData {
                batch_id: product.batch_id.clone(),
                product_name: product.product_name.clone(),
                supplier_name: product.supplier_name.clone(),
                description: product.description.clone(),
                created_at: product.created_at,
            },
            claims: claims.iter().map(ClaimContent::from).collect(),
        }
    }

    /// Builds a claim attestation from a claim row and its product's batch id.
    pub fn for_claim(claim: &Claim, batch_id: BatchId) -> Self {
        Self::Claim {
            data: ClaimData {
                claim_id: claim.id,
                product_batch_id: batch_id,
                claim_type: claim.claim_type.clone(),
                claim_description: claim.description.clone(),
                created_at: claim.created_at,
            },
        }
    }

    /// Produces the canonical byte representation.
    ///
    /// Key order is fixed by the canonical structs, claims are sorted, and
    /// timestamps are rendered at fixed microsecond precision, so two
    /// attestations with identical logical content canonicalize identically
    /// regardless of claim order.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Serialization` if JSON encoding fails.
    pub fn canonicalize(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Product { data, claims } => {
                let mut sorted: Vec<&ClaimContent> = claims.iter().collect();
                sorted.sort();
                serde_json::to_vec(&CanonicalProduct {
                    batch_id: data.batch_id.as_str(),
                    product_name: &data.product_name,
                    supplier_name: &data.supplier_name,
                    claims: sorted,
                    timestamp: canonical_timestamp(data.created_at),
                })?
            },
            Self::Claim { data } => serde_json::to_vec(&CanonicalClaim {
                claim_id: data.claim_id.to_string(),
                product_batch_id: data.product_batch_id.as_str(),
                claim_type: &data.claim_type,
                claim_description: &data.claim_description,
                timestamp: canonical_timestamp(data.created_at),
            })?,
        };

        Ok(bytes)
    }

    /// Hex SHA-256 over the canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Serialization` if canonicalization fails.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = self.canonicalize()?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Wraps the attestation in its wire envelope.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Serialization` if hashing fails.
    pub fn to_message(&self, submitted_at: DateTime<Utc>) -> Result<AttestationMessage> {
        let verification_hash = self.content_hash()?;
        let (kind, data) = match self {
            Self::Product { data, .. } => {
                (AttestationKind::Product, AttestationData::Product(data.clone()))
            },
            Self::Claim { data } => (AttestationKind::Claim, AttestationData::Claim(data.clone())),
        };

        Ok(AttestationMessage { kind, timestamp: submitted_at, data, verification_hash })
    }
}

/// Renders a timestamp at fixed microsecond precision.
fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Discriminator for attestation messages on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationKind {
    /// Product attestation.
    Product,
    /// Claim attestation.
    Claim,
}

/// Payload body of an attestation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttestationData {
    /// A claim attestation body.
    ///
    /// Tried first during deserialization; its required fields are disjoint
    /// from the product shape.
    Claim(ClaimData),

    /// A product attestation body.
    Product(ProductData),
}

/// The JSON message submitted to the consensus log.
///
/// The envelope `timestamp` records submission time and is deliberately
/// excluded from `verification_hash`, which covers only the canonical
/// content; resubmitting identical content yields an identical hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationMessage {
    /// Message discriminator.
    #[serde(rename = "type")]
    pub kind: AttestationKind,

    /// Submission time.
    pub timestamp: DateTime<Utc>,

    /// Canonical content of the attested entity.
    pub data: AttestationData,

    /// Hex SHA-256 over the canonical content.
    pub verification_hash: String,
}

impl AttestationMessage {
    /// Encodes the message for submission.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Serialization` if JSON encoding fails.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a message from raw log contents.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Serialization` for non-attestation payloads.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}
