//! Error type for the anchoring and verification services.

use thiserror::Error;
use veritag_consensus::ConsensusError;
use veritag_core::CoreError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the anchoring, verification, and reconciliation
/// services.
///
/// Wraps the storage and consensus taxonomies. Note what does NOT appear
/// here: a claim that failed to anchor, or a report that comes back
/// `PARTIALLY_VERIFIED` or `NO_PROOF`, is a reported outcome, not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Relational store operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Consensus log operation failed.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}

impl EngineError {
    /// Whether the failure is a transient infrastructure condition.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Core(e) => matches!(e, CoreError::Unavailable(_)),
            Self::Consensus(e) => e.is_transient(),
        }
    }
}
