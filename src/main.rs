//! Veritag claim anchoring service.
//!
//! Main entry point. Initializes configuration, the database pool, and the
//! single consensus network client, runs the reconciliation job, and
//! coordinates graceful shutdown: the client is constructed exactly once at
//! startup and closed exactly once on the way out.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use config::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use veritag_consensus::{ConsensusNetwork, ConsensusVerifier, RestConsensusClient};
use veritag_core::{storage::Storage, RealClock};
use veritag_verify::{PostgresProvenanceStorage, ProvenanceStorage, ReconciliationJob};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Veritag claim anchoring service");

    let config = Config::load()?;
    info!(
        database_url = %config.database_url_masked(),
        topic = %config.consensus_topic_id,
        network = %config.consensus_network,
        "Configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    let storage = Storage::new(pool.clone());
    storage.bootstrap().await.context("Failed to bootstrap database schema")?;
    info!("Database ready");

    let topic = config.topic_id()?;

    // The one long-lived network handle; shared by reference, closed once.
    let consensus: Arc<dyn ConsensusNetwork> =
        Arc::new(RestConsensusClient::new(config.to_gateway_config())?);

    let clock = Arc::new(RealClock::new());
    let provenance: Arc<dyn ProvenanceStorage> =
        Arc::new(PostgresProvenanceStorage::new(storage.clone()));

    let verifier =
        Arc::new(ConsensusVerifier::new(consensus.clone(), config.to_query_config(), clock.clone()));

    let shutdown = CancellationToken::new();
    let reconciliation = ReconciliationJob::new(
        provenance,
        verifier,
        topic,
        config.to_reconcile_config(),
        clock,
    );
    let reconcile_handle = tokio::spawn({
        let cancel = shutdown.clone();
        async move { reconciliation.run(cancel).await }
    });

    info!("Veritag is ready");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    shutdown.cancel();
    if let Err(e) = reconcile_handle.await {
        warn!(error = %e, "reconciliation task did not stop cleanly");
    }

    if let Err(e) = consensus.close().await {
        warn!(error = %e, "consensus client close reported an error");
    }
    info!("Consensus client closed");

    pool.close().await;
    info!("Database connections closed");

    info!("Veritag shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,veritag=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        () = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
