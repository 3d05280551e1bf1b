//! Consensus log integration: attestation hashing, submission, and queries.
//!
//! This crate owns everything that touches the external append-only log:
//! canonical attestation encoding with embedded content hashes, the network
//! client abstraction and its REST implementation, at-most-once submission,
//! bounded confirmation queries, and proof-link formatting.
//!
//! # Architecture
//!
//! ```text
//! Attestation ──hash──▶ AttestationMessage ──▶ SubmissionService ─▶ topic
//!                                                    │
//!                                          SubmissionReceipt (tx id)
//!                                                    │ persisted by caller
//!                                                    ▼
//! ConsensusVerifier ◀──subscribe/status── ConsensusNetwork (REST or fake)
//! ```
//!
//! Submission resolves on acknowledgement, not finality; verification is a
//! separate, later read path. The two are deliberately decoupled so a crash
//! between them leaves a repairable orphan rather than an inconsistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attestation;
pub mod client;
pub mod error;
pub mod links;
pub mod query;
pub mod rest;
pub mod submit;

pub use attestation::{Attestation, AttestationKind, AttestationMessage};
pub use client::{ConsensusNetwork, ConsensusRecord, Subscription, TransactionStatus};
pub use error::{ConsensusError, Result};
pub use links::{Network, ProofLinks};
pub use query::{ConsensusVerifier, QueryConfig, QueryWindow, TransactionVerification};
pub use rest::{GatewayConfig, RestConsensusClient};
pub use submit::{SubmissionReceipt, SubmissionService, MAX_MESSAGE_BYTES};
