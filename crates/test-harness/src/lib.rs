//! Test harness for Veritag integration and unit tests.
//!
//! Provides the deterministic fake consensus network, an in-memory
//! provenance store, fixture builders, and a wired test environment so
//! service tests run without a database or a live log.

pub mod fixtures;
pub mod network;
pub mod storage;

use std::sync::Arc;

pub use network::{FailureMode, FakeConsensusNetwork, SubmittedMessage};
pub use storage::InMemoryProvenanceStorage;
use tracing_subscriber::EnvFilter;
use veritag_consensus::{ConsensusVerifier, Network, QueryConfig, SubmissionService};
use veritag_core::{BatchIdGenerator, Clock, TestClock, TopicId};
use veritag_verify::{
    AnchorService, ProvenanceStorage, ReconcileConfig, ReconciliationJob, VerificationService,
};

/// Test environment with all engine collaborators wired to fakes.
pub struct TestEnv {
    /// Fake consensus network shared by all services.
    pub network: Arc<FakeConsensusNetwork>,

    /// In-memory provenance store.
    pub storage: Arc<InMemoryProvenanceStorage>,

    /// Controllable clock.
    pub clock: Arc<TestClock>,

    /// Topic the environment submits to and queries.
    pub topic: TopicId,
}

impl TestEnv {
    /// Creates a fresh environment.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,veritag=debug")),
            )
            .with_test_writer()
            .try_init();

        Self {
            network: Arc::new(FakeConsensusNetwork::new()),
            storage: Arc::new(InMemoryProvenanceStorage::new()),
            clock: Arc::new(TestClock::new()),
            topic: fixtures::test_topic(),
        }
    }

    /// The storage as the trait object services expect.
    pub fn storage_handle(&self) -> Arc<dyn ProvenanceStorage> {
        self.storage.clone()
    }

    /// The clock as the trait object services expect.
    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// A submission service bound to the environment's topic.
    pub fn submission_service(&self) -> Arc<SubmissionService> {
        Arc::new(SubmissionService::new(self.network.clone(), self.topic.clone()))
    }

    /// A verifier with default query configuration.
    pub fn verifier(&self) -> Arc<ConsensusVerifier> {
        self.verifier_with(QueryConfig::default())
    }

    /// A verifier with explicit query configuration.
    pub fn verifier_with(&self, config: QueryConfig) -> Arc<ConsensusVerifier> {
        Arc::new(ConsensusVerifier::new(self.network.clone(), config, self.clock_handle()))
    }

    /// A fully wired anchoring service.
    pub fn anchor_service(&self) -> AnchorService {
        AnchorService::new(
            self.storage_handle(),
            self.submission_service(),
            Arc::new(BatchIdGenerator::new(self.clock_handle())),
            self.clock_handle(),
        )
    }

    /// A fully wired verification service.
    pub fn verification_service(&self) -> VerificationService {
        VerificationService::new(
            self.storage_handle(),
            self.verifier(),
            self.topic.clone(),
            Network::Testnet,
            self.clock_handle(),
        )
    }

    /// A reconciliation job with the given configuration.
    pub fn reconciliation_job(&self, config: ReconcileConfig) -> ReconciliationJob {
        ReconciliationJob::new(
            self.storage_handle(),
            self.verifier(),
            self.topic.clone(),
            config,
            self.clock_handle(),
        )
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
