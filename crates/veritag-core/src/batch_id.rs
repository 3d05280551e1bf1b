//! Batch identifier generation.
//!
//! Produces unique, human-readable `PREFIX-YYYY-NNNN` identifiers checked
//! against the relational store. Generation is optimistic: the store's
//! uniqueness constraint is authoritative, and an insert-time violation is a
//! retry trigger handled by the caller, not a fatal error here.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::{
    error::{CoreError, Result},
    models::{BatchId, BATCH_PREFIX_MAX_LEN},
    time::Clock,
};

/// Default prefix when a product name yields no usable token.
pub const DEFAULT_PREFIX: &str = "PRODUCT";

/// Maximum candidate checks before falling back to a timestamp suffix.
pub const MAX_GENERATION_ATTEMPTS: u32 = 100;

/// Existence check against the relational store.
///
/// Implemented by the product repository in production and by in-memory
/// doubles in tests. Only existence is consulted here; uniqueness is still
/// enforced by the store's constraint at insert time, since check-then-insert
/// is not atomic across processes.
#[async_trait::async_trait]
pub trait BatchIdStore: Send + Sync {
    /// Returns whether a product with this batch id already exists.
    async fn exists(&self, candidate: &BatchId) -> Result<bool>;
}

/// Generator for batch identifiers.
///
/// Candidates walk the four-digit sequence space from a random starting
/// point, one step per attempt. The walk never revisits a candidate within a
/// full cycle, so a store that honestly reports prior ids sees at most one
/// collision probe per taken slot.
#[derive(Debug)]
pub struct BatchIdGenerator {
    clock: Arc<dyn Clock>,
    sequence: AtomicU32,
}

impl BatchIdGenerator {
    /// Creates a generator with a randomly seeded sequence.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let seed = rand::thread_rng().gen_range(0..10_000);
        Self { clock, sequence: AtomicU32::new(seed) }
    }

    /// Derives a batch-id prefix from a product name.
    ///
    /// Takes the first whitespace-separated token, keeps its ASCII
    /// alphanumerics, uppercases, and truncates to the prefix limit. Falls
    /// back to [`DEFAULT_PREFIX`] when nothing usable remains.
    pub fn derive_prefix(product_name: &str) -> String {
        let token = product_name
            .split_whitespace()
            .map(|t| {
                t.chars()
                    .filter(char::is_ascii_alphanumeric)
                    .map(|c| c.to_ascii_uppercase())
                    .take(BATCH_PREFIX_MAX_LEN)
                    .collect::<String>()
            })
            .find(|t| !t.is_empty());

        token.unwrap_or_else(|| DEFAULT_PREFIX.to_string())
    }

    /// Generates a batch id not currently present in the store.
    ///
    /// Performs one existence check per candidate, bounded at
    /// [`MAX_GENERATION_ATTEMPTS`]. On exhaustion, falls back to a
    /// timestamp-derived suffix without a further check so that generation
    /// always terminates; the store constraint catches the residual race.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for a malformed prefix, or any error
    /// the store reports during an existence check.
    pub async fn generate(&self, store: &dyn BatchIdStore, prefix: &str) -> Result<BatchId> {
        validate_prefix(prefix)?;
        let year = self.current_year();

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let suffix = self.sequence.fetch_add(1, Ordering::Relaxed) % 10_000;
            let candidate = BatchId::parse(&format!("{prefix}-{year}-{suffix:04}"))?;
            if !store.exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        let millis = self.now().timestamp_millis().unsigned_abs() % 10_000;
        tracing::warn!(
            prefix,
            attempts = MAX_GENERATION_ATTEMPTS,
            "batch id space saturated, falling back to timestamp suffix"
        );
        BatchId::parse(&format!("{prefix}-{year}-{millis:04}"))
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.now_system())
    }

    fn current_year(&self) -> i32 {
        self.now().year()
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    let ok = !prefix.is_empty()
        && prefix.len() <= BATCH_PREFIX_MAX_LEN
        && prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "batch id prefix must be 1-{BATCH_PREFIX_MAX_LEN} uppercase alphanumerics, got {prefix:?}"
        )))
    }
}
