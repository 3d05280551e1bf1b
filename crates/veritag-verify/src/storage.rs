//! Storage abstraction for the anchoring and verification services.
//!
//! Trait-based so service logic can be exercised against in-memory doubles
//! without a database. Production wires the concrete repository layer from
//! `veritag_core::storage` through [`PostgresProvenanceStorage`].

use chrono::{DateTime, Utc};
use veritag_core::{
    error::Result,
    models::{BatchId, Claim, ClaimId, Product, ProductId, TransactionId},
    storage::{claims::UnanchoredClaim, Storage},
    BatchIdStore,
};

/// Storage operations required by the anchoring and verification services.
#[async_trait::async_trait]
pub trait ProvenanceStorage: Send + Sync + 'static {
    /// Inserts a product under the batch-id uniqueness constraint.
    ///
    /// A collision must surface as `CoreError::Conflict` so the caller can
    /// regenerate and retry once.
    async fn insert_product(&self, product: &Product) -> Result<ProductId>;

    /// Inserts a claim with no proof recorded.
    async fn insert_claim(&self, claim: &Claim) -> Result<ClaimId>;

    /// Checks whether a batch id is taken.
    async fn batch_id_exists(&self, batch_id: &BatchId) -> Result<bool>;

    /// Finds a product by batch id.
    async fn find_product_by_batch_id(&self, batch_id: &BatchId) -> Result<Option<Product>>;

    /// Finds a product's claims, oldest first.
    async fn find_claims(&self, product_id: ProductId) -> Result<Vec<Claim>>;

    /// Records a submission receipt on a claim, exactly once.
    async fn record_proof(
        &self,
        claim_id: ClaimId,
        transaction_id: &TransactionId,
        consensus_timestamp: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Finds claims with no transaction id, oldest first.
    async fn find_unanchored_claims(&self, limit: i64) -> Result<Vec<UnanchoredClaim>>;
}

/// Production storage implementation over PostgreSQL repositories.
pub struct PostgresProvenanceStorage {
    storage: Storage,
}

impl PostgresProvenanceStorage {
    /// Creates a storage adapter over the repository layer.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl ProvenanceStorage for PostgresProvenanceStorage {
    async fn insert_product(&self, product: &Product) -> Result<ProductId> {
        self.storage.products.insert(product).await
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<ClaimId> {
        self.storage.claims.insert(claim).await
    }

    async fn batch_id_exists(&self, batch_id: &BatchId) -> Result<bool> {
        self.storage.products.exists_batch_id(batch_id).await
    }

    async fn find_product_by_batch_id(&self, batch_id: &BatchId) -> Result<Option<Product>> {
        self.storage.products.find_by_batch_id(batch_id).await
    }

    async fn find_claims(&self, product_id: ProductId) -> Result<Vec<Claim>> {
        self.storage.claims.find_by_product(product_id).await
    }

    async fn record_proof(
        &self,
        claim_id: ClaimId,
        transaction_id: &TransactionId,
        consensus_timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.storage.claims.record_proof(claim_id, transaction_id, consensus_timestamp).await
    }

    async fn find_unanchored_claims(&self, limit: i64) -> Result<Vec<UnanchoredClaim>> {
        self.storage.claims.find_unanchored(limit).await
    }
}

/// Adapter lending a [`ProvenanceStorage`] to the batch-id generator.
pub struct BatchIdStoreAdapter<'a>(pub &'a dyn ProvenanceStorage);

#[async_trait::async_trait]
impl BatchIdStore for BatchIdStoreAdapter<'_> {
    async fn exists(&self, candidate: &BatchId) -> Result<bool> {
        self.0.batch_id_exists(candidate).await
    }
}
