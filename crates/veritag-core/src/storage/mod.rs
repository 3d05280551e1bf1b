//! Database access layer implementing the repository pattern.
//!
//! Repositories translate between domain models and the relational schema.
//! All SQL lives here; the anchoring and verification services above this
//! layer never issue queries directly.

use std::sync::Arc;

use sqlx::PgPool;

pub mod claims;
pub mod products;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for product rows.
    pub products: Arc<products::Repository>,

    /// Repository for claim rows and proof recording.
    pub claims: Arc<claims::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            products: Arc::new(products::Repository::new(pool.clone())),
            claims: Arc::new(claims::Repository::new(pool)),
        }
    }

    /// Creates the schema if it does not exist.
    ///
    /// The uniqueness constraint on `batch_id` is what makes optimistic
    /// batch-id generation safe across concurrent process instances; the
    /// foreign key ties every claim to its owning product.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if DDL execution fails.
    pub async fn bootstrap(&self) -> Result<()> {
        let pool = self.products.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id UUID PRIMARY KEY,
                batch_id TEXT NOT NULL UNIQUE,
                product_name TEXT NOT NULL,
                supplier_name TEXT NOT NULL,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS claims (
                id UUID PRIMARY KEY,
                product_id UUID NOT NULL REFERENCES products(id),
                claim_type TEXT NOT NULL,
                description TEXT NOT NULL,
                consensus_transaction_id TEXT,
                consensus_timestamp TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_claims_product
            ON claims(product_id, created_at)
            "#,
        )
        .execute(&*pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_claims_unanchored
            ON claims(created_at)
            WHERE consensus_transaction_id IS NULL
            "#,
        )
        .execute(&*pool)
        .await?;

        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.products.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Actual database behavior is covered by integration tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
