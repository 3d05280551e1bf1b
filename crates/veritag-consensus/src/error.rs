//! Error types for consensus log operations.
//!
//! The taxonomy separates pre-network rejections (validation, oversized
//! payloads) from network conditions (unavailable, timeout) so callers can
//! persist products without proof instead of failing whole requests. A query
//! timeout is never conflated with a confirmed negative, and cancellation is
//! its own terminal condition, never reported as "not found".

use std::time::Duration;

use thiserror::Error;
use veritag_core::CoreError;

/// Result type alias for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Error type for submission, query, and subscription operations.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Input failed format validation before any network I/O.
    #[error("validation error: {message}")]
    Validation {
        /// What was malformed.
        message: String,
    },

    /// The topic reference does not exist or is not writable.
    #[error("invalid topic reference: {topic}")]
    InvalidTopic {
        /// The rejected topic id.
        topic: String,
    },

    /// The attestation exceeds the log's message size ceiling.
    ///
    /// Raised before submission; oversized payloads are never truncated.
    #[error("payload of {size} bytes exceeds the {limit}-byte message ceiling")]
    PayloadTooLarge {
        /// Size of the encoded attestation in bytes.
        size: usize,
        /// The log's message ceiling in bytes.
        limit: usize,
    },

    /// The consensus log or its gateway is unreachable.
    #[error("consensus network unavailable: {message}")]
    NetworkUnavailable {
        /// Error message describing the network failure.
        message: String,
    },

    /// A query exceeded its wait window.
    #[error("query timed out after {:?}", waited)]
    Timeout {
        /// How long the query waited before giving up.
        waited: Duration,
    },

    /// The caller cancelled the operation.
    ///
    /// The subscription was torn down before a result was reached; this is
    /// distinct from "no matching record".
    #[error("operation cancelled by caller")]
    Cancelled,

    /// The per-topic subscription failed mid-stream.
    #[error("subscription closed: {message}")]
    SubscriptionClosed {
        /// Why the subscription ended.
        message: String,
    },

    /// Attestation encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsensusError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Creates an invalid-topic error.
    pub fn invalid_topic(topic: impl Into<String>) -> Self {
        Self::InvalidTopic { topic: topic.into() }
    }

    /// Creates a payload-too-large error.
    pub fn payload_too_large(size: usize, limit: usize) -> Self {
        Self::PayloadTooLarge { size, limit }
    }

    /// Creates a network-unavailable error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkUnavailable { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(waited: Duration) -> Self {
        Self::Timeout { waited }
    }

    /// Creates a subscription-closed error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::SubscriptionClosed { message: message.into() }
    }

    /// Whether this error reflects a transient network condition.
    ///
    /// A caller seeing `true` may leave the affected claim without proof and
    /// let reconciliation or a later request repair it; `false` means the
    /// input itself needs fixing.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable { .. }
                | Self::Timeout { .. }
                | Self::SubscriptionClosed { .. }
        )
    }
}

impl From<CoreError> for ConsensusError {
    fn from(err: CoreError) -> Self {
        Self::Validation { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_identified() {
        assert!(ConsensusError::network("gateway down").is_transient());
        assert!(ConsensusError::timeout(Duration::from_secs(10)).is_transient());
        assert!(ConsensusError::subscription("stream reset").is_transient());

        assert!(!ConsensusError::validation("bad id").is_transient());
        assert!(!ConsensusError::invalid_topic("0.0.0").is_transient());
        assert!(!ConsensusError::payload_too_large(9000, 6144).is_transient());
        assert!(!ConsensusError::Cancelled.is_transient());
    }

    #[test]
    fn payload_error_reports_both_sizes() {
        let err = ConsensusError::payload_too_large(9000, 6144);
        let text = err.to_string();
        assert!(text.contains("9000"));
        assert!(text.contains("6144"));
    }
}
