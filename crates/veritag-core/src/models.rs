//! Core domain models and strongly-typed identifiers.
//!
//! Defines products, claims, and newtype wrappers for batch identifiers,
//! consensus transaction ids, and topic ids. Includes database serialization
//! traits and the text-format validation rules for externally visible ids.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed product identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. Products are immutable
/// once created and this ID follows them through their entire lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub Uuid);

impl ProductId {
    /// Creates a new random product ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ProductId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ProductId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ProductId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for ProductId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed claim identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    /// Creates a new random claim ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClaimId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for ClaimId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ClaimId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for ClaimId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Maximum length of a batch identifier prefix.
pub const BATCH_PREFIX_MAX_LEN: usize = 10;

/// Human-readable batch identifier assigned to a product.
///
/// Text format is `PREFIX-YYYY-NNNN` where `PREFIX` is 1-10 uppercase
/// alphanumerics, `YYYY` is a four-digit year, and `NNNN` a four-digit
/// sequence. Globally unique; uniqueness is enforced by a database
/// constraint, not by this type.
///
/// # Example
///
/// ```
/// use veritag_core::models::BatchId;
/// let id: BatchId = "COFFEE-2026-0042".parse().unwrap();
/// assert_eq!(id.prefix(), "COFFEE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    /// Parses and validates a batch identifier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the input does not match
    /// `PREFIX-YYYY-NNNN`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let mut parts = input.split('-');
        let (prefix, year, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(y), Some(s), None) => (p, y, s),
            _ => {
                return Err(CoreError::validation(format!(
                    "batch id must have form PREFIX-YYYY-NNNN, got {input:?}"
                )))
            },
        };

        let prefix_ok = !prefix.is_empty()
            && prefix.len() <= BATCH_PREFIX_MAX_LEN
            && prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !prefix_ok {
            return Err(CoreError::validation(format!(
                "batch id prefix must be 1-{BATCH_PREFIX_MAX_LEN} uppercase alphanumerics, got {prefix:?}"
            )));
        }

        for (name, part) in [("year", year), ("sequence", seq)] {
            if part.len() != 4 || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(CoreError::validation(format!(
                    "batch id {name} must be exactly 4 digits, got {part:?}"
                )));
            }
        }

        Ok(Self(input.to_string()))
    }

    /// Returns the prefix segment.
    pub fn prefix(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BatchId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BatchId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BatchId> for String {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

impl sqlx::Type<PgDb> for BatchId {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for BatchId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self::parse(s)?)
    }
}

impl sqlx::Encode<'_, PgDb> for BatchId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.0.as_str(), buf)
    }
}

/// Consensus log topic identifier in `shard.realm.num` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId(String);

impl TopicId {
    /// Parses and validates a topic identifier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` unless the input is three
    /// dot-separated decimal numbers.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = input.split('.').collect();
        let well_formed = parts.len() == 3
            && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return Err(CoreError::validation(format!(
                "topic id must have form shard.realm.num, got {input:?}"
            )));
        }
        Ok(Self(input.to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TopicId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TopicId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TopicId> for String {
    fn from(id: TopicId) -> Self {
        id.0
    }
}

/// Consensus transaction identifier in `payer@seconds.nanos` form.
///
/// Assigned by the network client at submission time. Two submissions of the
/// same attestation produce two distinct transaction ids; the engine never
/// treats them as interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    /// Parses and validates a transaction identifier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` unless the input is
    /// `shard.realm.num@seconds.nanos`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let malformed = || {
            CoreError::validation(format!(
                "transaction id must have form payer@seconds.nanos, got {input:?}"
            ))
        };

        let (payer, instant) = input.split_once('@').ok_or_else(malformed)?;
        TopicId::parse(payer).map_err(|_| malformed())?;

        let (seconds, nanos) = instant.split_once('.').ok_or_else(malformed)?;
        for part in [seconds, nanos] {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(malformed());
            }
        }

        Ok(Self(input.to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TransactionId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl sqlx::Type<PgDb> for TransactionId {
    fn type_info() -> PgTypeInfo {
        <str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for TransactionId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self::parse(s)?)
    }
}

impl sqlx::Encode<'_, PgDb> for TransactionId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.0.as_str(), buf)
    }
}

/// A registered product with its supplier-assigned metadata.
///
/// Owned by the relational store. The batch id is globally unique and
/// immutable once the row exists; everything else is write-once as well.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    /// Unique identifier for this product.
    pub id: ProductId,

    /// Human-readable batch identifier, unique across all products.
    pub batch_id: BatchId,

    /// Product name as registered by the supplier.
    pub product_name: String,

    /// Supplier name as registered.
    pub supplier_name: String,

    /// Optional free-form description.
    pub description: Option<String>,

    /// When this product was registered.
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product row for insertion.
    pub fn new(
        batch_id: BatchId,
        product_name: String,
        supplier_name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id: ProductId::new(), batch_id, product_name, supplier_name, description, created_at }
    }
}

/// A supplier claim about a product, with its consensus proof state.
///
/// Created at submission time. Mutated exactly once, when a log submission
/// succeeds, to record `consensus_transaction_id` and `consensus_timestamp`;
/// never updated thereafter. A claim with no transaction id either was never
/// submitted or is an orphan awaiting reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Claim {
    /// Unique identifier for this claim.
    pub id: ClaimId,

    /// Product this claim belongs to.
    pub product_id: ProductId,

    /// Claim category, e.g. `organic` or `fair-trade`.
    pub claim_type: String,

    /// Human-readable claim text.
    pub description: String,

    /// Transaction id returned by the consensus log submission, if any.
    pub consensus_transaction_id: Option<TransactionId>,

    /// Finality timestamp, once the log has confirmed the message.
    ///
    /// Usually absent right after submission; filled in by reconciliation or
    /// left to be read from the log at verification time.
    pub consensus_timestamp: Option<DateTime<Utc>>,

    /// When this claim was created.
    pub created_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a claim row for insertion, with no proof recorded yet.
    pub fn new(
        product_id: ProductId,
        claim_type: String,
        description: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ClaimId::new(),
            product_id,
            claim_type,
            description,
            consensus_transaction_id: None,
            consensus_timestamp: None,
            created_at,
        }
    }

    /// Whether a submission receipt has been persisted for this claim.
    pub fn has_proof(&self) -> bool {
        self.consensus_transaction_id.is_some()
    }
}
