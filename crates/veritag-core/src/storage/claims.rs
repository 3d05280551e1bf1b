//! Repository for claim database operations.
//!
//! Claims are written once at registration and mutated exactly once more,
//! when a submission receipt is recorded. The proof-recording update is
//! guarded so a transaction id can never be overwritten.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{BatchId, Claim, ClaimId, ProductId, TransactionId},
};

/// A claim joined with the batch id of its owning product.
///
/// Reconciliation needs the batch id to rebuild the claim's attestation
/// content hash without a second round trip per claim.
#[derive(Debug, Clone)]
pub struct UnanchoredClaim {
    /// The claim missing its transaction id.
    pub claim: Claim,

    /// Batch id of the owning product.
    pub batch_id: BatchId,
}

/// Repository for claim rows and proof recording.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a claim with no proof recorded.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or the product does not exist.
    pub async fn insert(&self, claim: &Claim) -> Result<ClaimId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO claims (
                id, product_id, claim_type, description,
                consensus_transaction_id, consensus_timestamp, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(claim.id.0)
        .bind(claim.product_id.0)
        .bind(&claim.claim_type)
        .bind(&claim.description)
        .bind(&claim.consensus_transaction_id)
        .bind(claim.consensus_timestamp)
        .bind(claim.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(ClaimId(id))
    }

    /// Finds all claims for a product, oldest first.
    ///
    /// Ordering matches submission order, which is sequential per product.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_product(&self, product_id: ProductId) -> Result<Vec<Claim>> {
        let claims = sqlx::query_as::<_, Claim>(
            r#"
            SELECT id, product_id, claim_type, description,
                   consensus_transaction_id, consensus_timestamp, created_at
            FROM claims
            WHERE product_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(product_id.0)
        .fetch_all(&*self.pool)
        .await?;

        Ok(claims)
    }

    /// Records a submission receipt on a claim, exactly once.
    ///
    /// The update is guarded on `consensus_transaction_id IS NULL`; a second
    /// attempt returns `CoreError::Conflict` and a missing claim returns
    /// `CoreError::NotFound`, so callers can distinguish "already repaired"
    /// from "nothing to repair".
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a transaction id is already recorded, `NotFound`
    /// if the claim does not exist, or `Database` on query failure.
    pub async fn record_proof(
        &self,
        claim_id: ClaimId,
        transaction_id: &TransactionId,
        consensus_timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE claims
            SET consensus_transaction_id = $1, consensus_timestamp = $2
            WHERE id = $3 AND consensus_transaction_id IS NULL
            "#,
        )
        .bind(transaction_id)
        .bind(consensus_timestamp)
        .bind(claim_id.0)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM claims WHERE id = $1)")
            .bind(claim_id.0)
            .fetch_one(&*self.pool)
            .await?;

        if exists.0 {
            Err(CoreError::conflict(format!("claim {claim_id} already has a transaction id")))
        } else {
            Err(CoreError::not_found(format!("claim {claim_id} does not exist")))
        }
    }

    /// Finds claims with no transaction id, oldest first.
    ///
    /// Feeds the reconciliation job; the batch id of the owning product is
    /// joined in so the claim's content hash can be rebuilt locally.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_unanchored(&self, limit: i64) -> Result<Vec<UnanchoredClaim>> {
        use sqlx::{FromRow, Row};

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.product_id, c.claim_type, c.description,
                   c.consensus_transaction_id, c.consensus_timestamp, c.created_at,
                   p.batch_id
            FROM claims c
            JOIN products p ON p.id = c.product_id
            WHERE c.consensus_transaction_id IS NULL
            ORDER BY c.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        let mut unanchored = Vec::with_capacity(rows.len());
        for row in &rows {
            unanchored.push(UnanchoredClaim {
                claim: Claim::from_row(row)?,
                batch_id: row.try_get("batch_id")?,
            });
        }

        Ok(unanchored)
    }
}
