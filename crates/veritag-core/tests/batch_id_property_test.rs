//! Property-based tests for batch identifier generation.
//!
//! Tests the invariants that must hold regardless of prefix or store state:
//! every generated id is well-formed, and sustained generation against an
//! honest store never repeats an id.

#![allow(clippy::unwrap_used)] // Test ids and regexes are known to be valid

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use veritag_core::{
    batch_id::BatchIdStore, error::Result, BatchId, BatchIdGenerator, RealClock,
};

/// Deterministic property test configuration for CI stability.
fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 50,
        timeout: 5000,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

/// Store that remembers every id handed out and reports it as taken.
#[derive(Default)]
struct RememberingStore {
    seen: Mutex<HashSet<String>>,
}

impl RememberingStore {
    fn remember(&self, id: &BatchId) {
        self.seen.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait::async_trait]
impl BatchIdStore for RememberingStore {
    async fn exists(&self, candidate: &BatchId) -> Result<bool> {
        Ok(self.seen.lock().unwrap().contains(candidate.as_str()))
    }
}

/// Store with nothing in it.
struct EmptyStore;

#[async_trait::async_trait]
impl BatchIdStore for EmptyStore {
    async fn exists(&self, _candidate: &BatchId) -> Result<bool> {
        Ok(false)
    }
}

fn valid_prefix_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z0-9]{1,10}").unwrap()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn generated_ids_are_well_formed(prefix in valid_prefix_strategy()) {
        let generator = BatchIdGenerator::new(Arc::new(RealClock::new()));
        let id = block_on(generator.generate(&EmptyStore, &prefix)).unwrap();

        // Round-trips through the validating parser and keeps the prefix.
        prop_assert!(BatchId::parse(id.as_str()).is_ok());
        prop_assert_eq!(id.prefix(), prefix.as_str());

        let suffix = id.as_str().rsplit('-').next().unwrap();
        prop_assert_eq!(suffix.len(), 4);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn derived_prefixes_are_always_usable(name in ".{0,64}") {
        let prefix = BatchIdGenerator::derive_prefix(&name);
        prop_assert!(!prefix.is_empty());
        prop_assert!(prefix.len() <= 10);
        prop_assert!(prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

#[tokio::test]
async fn sustained_generation_yields_distinct_ids() {
    // Walk the whole four-digit space against a store that honestly reports
    // every id already handed out: 10,000 generations, 10,000 distinct ids.
    let generator = BatchIdGenerator::new(Arc::new(RealClock::new()));
    let store = RememberingStore::default();
    let mut ids = HashSet::new();

    for _ in 0..10_000 {
        let id = generator.generate(&store, "COFFEE").await.unwrap();
        store.remember(&id);
        assert!(ids.insert(id.to_string()), "generator repeated id {id}");
    }

    assert_eq!(ids.len(), 10_000);
}
