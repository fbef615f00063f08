//! Listings catalog service.
//!
//! Consumes listing change events from Redpanda and reconciles them into the
//! `PostgreSQL` listing store, evicting cached read pages after each change.

use anyhow::Context;
use listings_core::cache::ListingCache;
use listings_core::environment::SystemClock;
use listings_core::event_bus::EventBus;
use listings_core::store::ListingStore;
use listings_postgres::PostgresListingStore;
use listings_redpanda::RedpandaEventBus;
use listings_runtime::metrics::MetricsServer;
use listings_runtime::{InMemoryListingCache, Reconciler, ReconcilerPool};
use listings_service::config::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting listings service");
    info!(
        database_url = %config.database.redacted_url(),
        table = %config.database.table,
        brokers = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        workers = config.reconciler.workers,
        "Configuration loaded"
    );

    let mut metrics_server = MetricsServer::new(
        config
            .metrics_addr()
            .context("Invalid metrics address")?,
    );
    metrics_server
        .start()
        .context("Failed to start metrics server")?;

    info!("Connecting to listing store...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store = PostgresListingStore::with_table(pool, &config.database.table)?;
    store.migrate().await?;
    info!("Listing store ready");

    info!("Connecting to Redpanda event bus...");
    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .max_deliveries(config.redpanda.max_deliveries)
            .dead_letter_topic(&config.redpanda.dead_letter_topic)
            .build()?,
    );
    info!("Event bus connected");

    let store: Arc<dyn ListingStore> = Arc::new(store);
    let cache: Arc<dyn ListingCache> = Arc::new(InMemoryListingCache::new(
        config.cache.capacity,
        config.cache_ttl(),
    ));
    let reconciler = Arc::new(
        Reconciler::new(store, cache, Arc::new(SystemClock)).with_retry_delay(config.retry_delay()),
    );

    let pool = ReconcilerPool::spawn(
        config.reconciler.workers,
        reconciler,
        event_bus,
        config.redpanda.topic.clone(),
    );
    info!(workers = pool.len(), "Reconciler workers started");

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining workers");

    let processed = pool.shutdown().await?;
    info!(processed, "Listings service stopped");
    Ok(())
}
