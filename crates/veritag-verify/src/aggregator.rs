//! Verification status aggregation.
//!
//! Pure classification and folding of per-claim proof state into one
//! verification report. All inputs are gathered by the caller; nothing here
//! touches the store or the network, which keeps the decision table easy to
//! test exhaustively.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veritag_consensus::ProofLinks;
use veritag_core::{BatchId, ClaimId, TransactionId};

/// Proof state of a single claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimProofState {
    /// No transaction id persisted; the claim was never anchored.
    NoProof,

    /// A transaction id is persisted but the log has not yet confirmed it.
    ///
    /// Expected immediately after submission; the log confirms minutes
    /// later. Never treated as a failure.
    ProofPendingConfirmation,

    /// The log has a confirmed record of the claim's transaction.
    Confirmed,
}

impl fmt::Display for ClaimProofState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProof => write!(f, "no_proof"),
            Self::ProofPendingConfirmation => write!(f, "proof_pending_confirmation"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Overall verification status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    /// The product has no claims at all.
    NoClaims,

    /// Claims exist but none has a transaction id.
    NoProof,

    /// Every claim is confirmed on the log.
    Verified,

    /// Some claims are confirmed, others are not.
    PartiallyVerified,

    /// Claims have transaction ids but none is confirmed yet.
    Unverified,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoClaims => write!(f, "NO_CLAIMS"),
            Self::NoProof => write!(f, "NO_PROOF"),
            Self::Verified => write!(f, "VERIFIED"),
            Self::PartiallyVerified => write!(f, "PARTIALLY_VERIFIED"),
            Self::Unverified => write!(f, "UNVERIFIED"),
        }
    }
}

/// One claim's classified state, as input to report computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedClaim {
    /// The claim being reported on.
    pub claim_id: ClaimId,

    /// Claim category, echoed into the report.
    pub claim_type: String,

    /// Classified proof state.
    pub state: ClaimProofState,

    /// Transaction id persisted on the claim, if any.
    pub transaction_id: Option<TransactionId>,

    /// Finality timestamp read from the log, for confirmed claims.
    pub consensus_timestamp: Option<DateTime<Utc>>,

    /// Evidence URIs, for confirmed claims.
    pub proof_links: Option<ProofLinks>,
}

/// Derived summary of confirmed vs. total claims for one product.
///
/// Computed fresh per request; confirmation state changes over time as the
/// log reaches finality on recently submitted attestations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Batch id of the verified product.
    pub batch_id: BatchId,

    /// Overall status per the aggregation decision table.
    pub overall_status: OverallStatus,

    /// Total number of claims on the product.
    pub total_claims: usize,

    /// Claims with a persisted transaction id.
    pub claims_with_proof: usize,

    /// Claims confirmed on the log.
    pub verified_claims: usize,

    /// `round(100 * verified / total)`, zero when there are no claims.
    pub verification_percentage: u8,

    /// Per-claim breakdown, in claim creation order.
    pub claims: Vec<ClassifiedClaim>,

    /// When this report was computed.
    pub generated_at: DateTime<Utc>,
}

/// Folds classified claims into a verification report.
pub fn compute_report(
    batch_id: BatchId,
    claims: Vec<ClassifiedClaim>,
    generated_at: DateTime<Utc>,
) -> VerificationReport {
    let total_claims = claims.len();
    let claims_with_proof = claims.iter().filter(|c| c.state != ClaimProofState::NoProof).count();
    let verified_claims = claims.iter().filter(|c| c.state == ClaimProofState::Confirmed).count();

    let overall_status = if total_claims == 0 {
        OverallStatus::NoClaims
    } else if claims_with_proof == 0 {
        OverallStatus::NoProof
    } else if verified_claims == 0 {
        OverallStatus::Unverified
    } else if verified_claims == total_claims {
        OverallStatus::Verified
    } else {
        OverallStatus::PartiallyVerified
    };

    let verification_percentage = percentage(verified_claims, total_claims);

    VerificationReport {
        batch_id,
        overall_status,
        total_claims,
        claims_with_proof,
        verified_claims,
        verification_percentage,
        claims,
        generated_at,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn percentage(verified: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((verified as f64 / total as f64) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_id() -> BatchId {
        BatchId::parse("COFFEE-2026-0042").unwrap()
    }

    fn claim_in(state: ClaimProofState) -> ClassifiedClaim {
        let transaction_id = match state {
            ClaimProofState::NoProof => None,
            _ => Some(TransactionId::parse("0.0.1234@1700000000.000000001").unwrap()),
        };
        ClassifiedClaim {
            claim_id: ClaimId::new(),
            claim_type: "organic".into(),
            state,
            transaction_id,
            consensus_timestamp: None,
            proof_links: None,
        }
    }

    fn report_for(states: &[ClaimProofState]) -> VerificationReport {
        let claims = states.iter().map(|s| claim_in(*s)).collect();
        compute_report(batch_id(), claims, Utc::now())
    }

    #[test]
    fn zero_claims_is_no_claims() {
        let report = report_for(&[]);
        assert_eq!(report.overall_status, OverallStatus::NoClaims);
        assert_eq!(report.verification_percentage, 0);
    }

    #[test]
    fn no_transaction_ids_is_no_proof() {
        use ClaimProofState::NoProof;
        let report = report_for(&[NoProof, NoProof, NoProof]);
        assert_eq!(report.overall_status, OverallStatus::NoProof);
        assert_eq!(report.claims_with_proof, 0);
        assert_eq!(report.verification_percentage, 0);
    }

    #[test]
    fn all_confirmed_is_verified() {
        use ClaimProofState::Confirmed;
        let report = report_for(&[Confirmed, Confirmed, Confirmed]);
        assert_eq!(report.overall_status, OverallStatus::Verified);
        assert_eq!(report.verification_percentage, 100);
    }

    #[test]
    fn confirmed_with_unanchored_sibling_is_partial() {
        use ClaimProofState::{Confirmed, NoProof};
        let report = report_for(&[Confirmed, Confirmed, NoProof]);
        assert_eq!(report.overall_status, OverallStatus::PartiallyVerified);
        assert_eq!(report.claims_with_proof, 2);
        assert_eq!(report.verified_claims, 2);
        // round(100 * 2/3)
        assert_eq!(report.verification_percentage, 67);
    }

    #[test]
    fn anchored_but_unconfirmed_is_unverified() {
        use ClaimProofState::ProofPendingConfirmation;
        let report = report_for(&[ProofPendingConfirmation, ProofPendingConfirmation]);
        assert_eq!(report.overall_status, OverallStatus::Unverified);
        assert_eq!(report.claims_with_proof, 2);
        assert_eq!(report.verification_percentage, 0);
    }

    #[test]
    fn pending_and_confirmed_mix_is_partial() {
        use ClaimProofState::{Confirmed, ProofPendingConfirmation};
        let report = report_for(&[Confirmed, ProofPendingConfirmation]);
        assert_eq!(report.overall_status, OverallStatus::PartiallyVerified);
        assert_eq!(report.verification_percentage, 50);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OverallStatus::PartiallyVerified).unwrap();
        assert_eq!(json, "\"PARTIALLY_VERIFIED\"");
        let json = serde_json::to_string(&OverallStatus::NoClaims).unwrap();
        assert_eq!(json, "\"NO_CLAIMS\"");
    }
}
