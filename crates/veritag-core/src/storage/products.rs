//! Repository for product database operations.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    batch_id::BatchIdStore,
    error::Result,
    models::{BatchId, Product, ProductId},
};

/// Repository for product rows.
///
/// Inserts rely on the `batch_id` uniqueness constraint: a violation maps to
/// `CoreError::Conflict`, which the anchoring service treats as a single
/// regenerate-and-retry trigger rather than a failure.
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

    /// Inserts a product.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Conflict` on a batch-id collision, or
    /// `CoreError::Database` for other insert failures.
    pub async fn insert(&self, product: &Product) -> Result<ProductId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO products (id, batch_id, product_name, supplier_name, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(product.id.0)
        .bind(&product.batch_id)
        .bind(&product.product_name)
        .bind(&product.supplier_name)
        .bind(&product.description)
        .bind(product.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(ProductId(id))
    }

    /// Finds a product by its batch identifier.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_batch_id(&self, batch_id: &BatchId) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, batch_id, product_name, supplier_name, description, created_at
            FROM products
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(product)
    }

    /// Checks whether a batch identifier is already taken.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn exists_batch_id(&self, batch_id: &BatchId) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM products WHERE batch_id = $1)")
                .bind(batch_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(exists.0)
    }
}

#[async_trait::async_trait]
impl BatchIdStore for Repository {
    async fn exists(&self, candidate: &BatchId) -> Result<bool> {
        self.exists_batch_id(candidate).await
    }
}
