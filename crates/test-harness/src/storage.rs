//! In-memory implementation of the provenance storage trait.
//!
//! Mirrors the constraints the real schema enforces: batch-id uniqueness on
//! product insert and write-once semantics for claim proof recording. Adds
//! failure injection so service tests can exercise the conflict-retry and
//! orphaned-claim paths.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use veritag_core::{
    error::{CoreError, Result},
    models::{BatchId, Claim, ClaimId, Product, ProductId, TransactionId},
    storage::claims::UnanchoredClaim,
};
use veritag_verify::ProvenanceStorage;

#[derive(Default)]
struct State {
    products: Vec<Product>,
    claims: Vec<Claim>,
    injected_insert_conflicts: u32,
    fail_record_proof: bool,
    unavailable: bool,
}

/// In-memory provenance store.
#[derive(Default)]
pub struct InMemoryProvenanceStorage {
    state: Mutex<State>,
}

impl InMemoryProvenanceStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` product inserts fail with a conflict.
    ///
    /// Simulates losing the check-then-insert race to a concurrent writer.
    pub fn inject_insert_conflicts(&self, count: u32) {
        self.lock().injected_insert_conflicts = count;
    }

    /// Makes every proof-recording call fail.
    ///
    /// Creates orphans: submissions succeed but transaction ids are never
    /// persisted, leaving repairs to reconciliation.
    pub fn fail_record_proof(&self, enabled: bool) {
        self.lock().fail_record_proof = enabled;
    }

    /// Makes every operation report the store as unreachable.
    pub fn set_unavailable(&self, enabled: bool) {
        self.lock().unavailable = enabled;
    }

    /// Returns a claim by id.
    pub fn claim(&self, claim_id: ClaimId) -> Option<Claim> {
        self.lock().claims.iter().find(|c| c.id == claim_id).cloned()
    }

    /// Returns all products.
    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ensure_available(state: &State) -> Result<()> {
        if state.unavailable {
            return Err(CoreError::unavailable("injected store outage"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProvenanceStorage for InMemoryProvenanceStorage {
    async fn insert_product(&self, product: &Product) -> Result<ProductId> {
        let mut state = self.lock();
        Self::ensure_available(&state)?;

        if state.injected_insert_conflicts > 0 {
            state.injected_insert_conflicts -= 1;
            return Err(CoreError::conflict("injected unique constraint violation"));
        }
        if state.products.iter().any(|p| p.batch_id == product.batch_id) {
            return Err(CoreError::conflict(format!(
                "unique constraint violation: batch id {} already exists",
                product.batch_id
            )));
        }

        state.products.push(product.clone());
        Ok(product.id)
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<ClaimId> {
        let mut state = self.lock();
        Self::ensure_available(&state)?;

        if !state.products.iter().any(|p| p.id == claim.product_id) {
            return Err(CoreError::conflict(format!(
                "foreign key constraint violation: product {} does not exist",
                claim.product_id
            )));
        }

        state.claims.push(claim.clone());
        Ok(claim.id)
    }

    async fn batch_id_exists(&self, batch_id: &BatchId) -> Result<bool> {
        let state = self.lock();
        Self::ensure_available(&state)?;
        Ok(state.products.iter().any(|p| &p.batch_id == batch_id))
    }

    async fn find_product_by_batch_id(&self, batch_id: &BatchId) -> Result<Option<Product>> {
        let state = self.lock();
        Self::ensure_available(&state)?;
        Ok(state.products.iter().find(|p| &p.batch_id == batch_id).cloned())
    }

    async fn find_claims(&self, product_id: ProductId) -> Result<Vec<Claim>> {
        let state = self.lock();
        Self::ensure_available(&state)?;
        Ok(state.claims.iter().filter(|c| c.product_id == product_id).cloned().collect())
    }

    async fn record_proof(
        &self,
        claim_id: ClaimId,
        transaction_id: &TransactionId,
        consensus_timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_available(&state)?;

        if state.fail_record_proof {
            return Err(CoreError::Database("injected write failure".to_string()));
        }

        let Some(claim) = state.claims.iter_mut().find(|c| c.id == claim_id) else {
            return Err(CoreError::not_found(format!("claim {claim_id} does not exist")));
        };

        if claim.consensus_transaction_id.is_some() {
            return Err(CoreError::conflict(format!(
                "claim {claim_id} already has a transaction id"
            )));
        }

        claim.consensus_transaction_id = Some(transaction_id.clone());
        claim.consensus_timestamp = consensus_timestamp;
        Ok(())
    }

    async fn find_unanchored_claims(&self, limit: i64) -> Result<Vec<UnanchoredClaim>> {
        let state = self.lock();
        Self::ensure_available(&state)?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(state
            .claims
            .iter()
            .filter(|c| c.consensus_transaction_id.is_none())
            .filter_map(|claim| {
                state.products.iter().find(|p| p.id == claim.product_id).map(|product| {
                    UnanchoredClaim { claim: claim.clone(), batch_id: product.batch_id.clone() }
                })
            })
            .take(limit)
            .collect())
    }
}
