//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the catalog:
//! - Change event reconciliation outcomes and latency
//! - Cache hits, misses and invalidations per namespace
//! - Change event publishing
//!
//! # Example
//!
//! ```rust,no_run
//! use listings_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use listings_core::cache::CacheNamespace;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{
    Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and start the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime; the listener runs as a
    /// spawned task.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be configured or
    /// the listener cannot be created.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the new one is
    /// discarded with a warning and no listener is started.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let Some(handle) = install(recorder) else {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        };

        let addr = self.addr;
        tokio::spawn(async move {
            // ExporterError implements neither Debug nor Display.
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics listener stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Install `recorder` globally, then describe the catalog metrics on it.
///
/// Returns `None` if another recorder is already installed.
fn install(recorder: PrometheusRecorder) -> Option<PrometheusHandle> {
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok()?;
    // Descriptions only reach the recorder installed at the time of the call.
    register_metrics();
    Some(handle)
}

/// Register all metric descriptions.
fn register_metrics() {
    // Reconciler Metrics
    describe_counter!(
        "listing_events_total",
        "Total number of change events reconciled, by outcome"
    );
    describe_histogram!(
        "listing_event_duration_seconds",
        "Time taken to reconcile a change event"
    );

    // Cache Metrics
    describe_counter!(
        "listing_cache_hits_total",
        "Total number of cache lookups that found a page"
    );
    describe_counter!(
        "listing_cache_misses_total",
        "Total number of cache lookups that found nothing"
    );
    describe_counter!(
        "listing_cache_invalidations_total",
        "Total number of whole-namespace cache evictions"
    );

    // Publisher Metrics
    describe_counter!(
        "listing_events_published_total",
        "Total number of change events published"
    );
    describe_counter!(
        "listing_publish_errors_total",
        "Total number of change events that failed to publish"
    );
}

/// Reconciler metrics recorder.
pub struct ReconcilerMetrics;

impl ReconcilerMetrics {
    /// Record a reconciled event.
    pub fn record(outcome: &'static str, duration: Duration) {
        counter!("listing_events_total", "outcome" => outcome).increment(1);
        histogram!("listing_event_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Cache metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a cache hit.
    pub fn record_hit(namespace: CacheNamespace) {
        counter!("listing_cache_hits_total", "namespace" => namespace.as_str()).increment(1);
    }

    /// Record a cache miss.
    pub fn record_miss(namespace: CacheNamespace) {
        counter!("listing_cache_misses_total", "namespace" => namespace.as_str()).increment(1);
    }

    /// Record a namespace eviction.
    pub fn record_invalidation(namespace: CacheNamespace) {
        counter!("listing_cache_invalidations_total", "namespace" => namespace.as_str())
            .increment(1);
    }
}

/// Publisher metrics recorder.
pub struct PublisherMetrics;

impl PublisherMetrics {
    /// Record a published event.
    pub fn record_publish() {
        counter!("listing_events_published_total").increment(1);
    }

    /// Record a publish error.
    pub fn record_publish_error() {
        counter!("listing_publish_errors_total").increment(1);
    }
}
