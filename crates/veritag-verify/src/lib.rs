//! Anchoring, verification, and reconciliation services.
//!
//! Ties the storage layer and the consensus crate together: product
//! registration with sequential claim anchoring, per-request verification
//! reports, and the background job that repairs claims whose attestation
//! reached the log but whose transaction id was never recorded locally.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod anchor;
pub mod error;
pub mod reconcile;
pub mod storage;
pub mod verify;

pub use aggregator::{
    compute_report, ClaimProofState, ClassifiedClaim, OverallStatus, VerificationReport,
};
pub use anchor::{
    AnchorService, ClaimAnchorOutcome, NewClaim, RegisterProductRequest, RegistrationOutcome,
};
pub use error::{EngineError, Result};
pub use reconcile::{ReconcileConfig, ReconciliationJob, ReconciliationSummary};
pub use storage::{PostgresProvenanceStorage, ProvenanceStorage};
pub use verify::VerificationService;
