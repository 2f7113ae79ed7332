//! Prometheus metrics for observability and monitoring.
//!
//! Covers the store runtime and the marketplace flows that matter to
//! operations (withdrawals, verification submissions, uploads).
//!
//! # Example
//!
//! ```rust,no_run
//! use eventhaiti_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Serve `exporter.render()` from a `/metrics` route
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder handle.
///
/// Rendering is left to the caller so the exposition can be mounted on
/// whatever listener the server runs.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder that is already installed (e.g. by another test) is
    /// tolerated; the handle then stays `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!("store.actions.processed", "Actions reduced by any store");
    describe_counter!("store.effects.failed", "Effects whose I/O failed and was reported back as an action");

    // Marketplace
    describe_counter!("withdrawals.requested", "Accepted withdrawal requests, labelled by method");
    describe_counter!("withdrawals.rejected", "Refused withdrawal requests, labelled by reason");
    describe_counter!("verification.submitted", "Verification requests submitted for review");
    describe_counter!("uploads.stored", "Verification documents written to the file store");
    describe_histogram!("http.request.duration_seconds", "HTTP request handling time");
}

/// Marketplace metrics recorder.
pub struct MarketplaceMetrics;

impl MarketplaceMetrics {
    /// Record an accepted withdrawal.
    pub fn record_withdrawal(method: &'static str) {
        counter!("withdrawals.requested", "method" => method).increment(1);
    }

    /// Record a refused withdrawal.
    pub fn record_withdrawal_rejected(reason: &'static str) {
        counter!("withdrawals.rejected", "reason" => reason).increment(1);
    }

    /// Record a verification submission.
    pub fn record_verification_submitted() {
        counter!("verification.submitted").increment(1);
    }

    /// Record a stored upload.
    pub fn record_upload(document_type: String) {
        counter!("uploads.stored", "document_type" => document_type).increment(1);
    }

    /// Record an effect whose I/O failed.
    pub fn record_effect_failure() {
        counter!("store.effects.failed").increment(1);
    }

    /// Record request latency.
    pub fn record_request(duration: Duration) {
        histogram!("http.request.duration_seconds").record(duration.as_secs_f64());
    }
}
