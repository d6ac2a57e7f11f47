//! Observability infrastructure for the exporter
//!
//! Provides:
//! - The metric store published on `/metrics` (running jobs, image presence,
//!   poll latency and poll errors)
//! - Structured JSON logging with tracing

use crate::error::PollError;
use dashmap::DashSet;
use prometheus::core::Collector as _;
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Namespace prefixed to every exported metric
pub const NAMESPACE: &str = "Nosana";

/// Label carrying the image reference on the presence gauge
pub const IMAGE_LABEL: &str = "imageName";

/// Histogram buckets for poll latency (in seconds)
const POLL_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

struct ExporterMetricsInner {
    registry: Registry,
    running_job: Gauge,
    running_image: GaugeVec,
    /// Label values currently present on `running_image`
    tracked_images: DashSet<String>,
    poll_duration_seconds: Histogram,
    poll_errors: IntCounterVec,
}

/// Metric store shared by the poll loop (writer) and the HTTP server (readers)
///
/// Each store owns its own Prometheus registry, so independent stores never
/// collide. Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    inner: Arc<ExporterMetricsInner>,
}

impl ExporterMetrics {
    /// Create and register all exporter metrics in a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let running_job = Gauge::with_opts(
            Opts::new("running_job", "Number of running jobs").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(running_job.clone()))?;

        let running_image = GaugeVec::new(
            Opts::new("running_image", "Name of the image running").namespace(NAMESPACE),
            &[IMAGE_LABEL],
        )?;
        registry.register(Box::new(running_image.clone()))?;

        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "poll_duration_seconds",
                "Time spent polling the container runtime API",
            )
            .namespace(NAMESPACE)
            .buckets(POLL_LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(poll_duration_seconds.clone()))?;

        let poll_errors = IntCounterVec::new(
            Opts::new(
                "poll_errors_total",
                "Total number of failed polls of the container runtime API",
            )
            .namespace(NAMESPACE),
            &["reason"],
        )?;
        registry.register(Box::new(poll_errors.clone()))?;

        Ok(Self {
            inner: Arc::new(ExporterMetricsInner {
                registry,
                running_job,
                running_image,
                tracked_images: DashSet::new(),
                poll_duration_seconds,
                poll_errors,
            }),
        })
    }

    /// Overwrite the running job gauge
    pub fn set_running_jobs(&self, count: usize) {
        self.inner.running_job.set(count as f64);
    }

    pub fn running_jobs(&self) -> f64 {
        self.inner.running_job.get()
    }

    /// Mark an image as observed. Idempotent.
    pub fn mark_image_present(&self, image: &str) {
        self.inner
            .running_image
            .with_label_values(&[image])
            .set(1.0);
        self.inner.tracked_images.insert(image.to_string());
    }

    /// Current presence value of an image, `None` if it has no series
    pub fn image_presence(&self, image: &str) -> Option<f64> {
        if !self.inner.tracked_images.contains(image) {
            return None;
        }
        self.inner
            .running_image
            .get_metric_with_label_values(&[image])
            .ok()
            .map(|gauge| gauge.get())
    }

    /// Images with a presence series, sorted
    pub fn tracked_images(&self) -> Vec<String> {
        let mut images: Vec<String> = self
            .inner
            .tracked_images
            .iter()
            .map(|image| image.key().clone())
            .collect();
        images.sort();
        images
    }

    /// Drop the presence series of every image not in `seen`.
    /// Returns the number of series removed.
    pub fn expire_images_except(&self, seen: &HashSet<String>) -> usize {
        let mut removed = 0;
        self.inner.tracked_images.retain(|image| {
            if seen.contains(image) {
                return true;
            }
            if self.inner.running_image.remove_label_values(&[image.as_str()]).is_ok() {
                removed += 1;
            }
            false
        });
        removed
    }

    /// Record how long a poll cycle took
    pub fn observe_poll_duration(&self, duration_secs: f64) {
        self.inner.poll_duration_seconds.observe(duration_secs);
    }

    /// Increment the poll error counter for a failure reason
    pub fn inc_poll_errors(&self, reason: &str) {
        self.inner.poll_errors.with_label_values(&[reason]).inc();
    }

    /// Errors recorded for a reason. Reading never creates a series.
    pub fn poll_errors(&self, reason: &str) -> u64 {
        self.inner
            .poll_errors
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| metric.get_label().iter().any(|l| l.get_value() == reason))
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    pub fn poll_count(&self) -> u64 {
        self.inner.poll_duration_seconds.get_sample_count()
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for exporter events
///
/// Provides consistent JSON-formatted logging for poll results
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    source_url: String,
}

impl StructuredLogger {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
        }
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "exporter_started",
            exporter_version = %version,
            source_url = %self.source_url,
            listen_addr = %listen_addr,
            "Exporter server: http://{}/metrics",
            listen_addr
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            source_url = %self.source_url,
            reason = %reason,
            "Exporter shutting down"
        );
    }

    /// Log a container found running a matching image
    pub fn log_image_found(&self, image: &str) {
        info!(
            event = "image_found",
            source_url = %self.source_url,
            image = %image,
            "Found container with matching image {}",
            image
        );
    }

    /// Log a failed poll
    pub fn log_poll_failure(&self, err: &PollError) {
        error!(
            event = "poll_failed",
            url = %err.url(),
            reason = err.reason(),
            error = %error_chain(err),
            "Poll of container runtime failed"
        );
    }

    /// Log a completed poll
    pub fn log_poll_complete(&self, running_jobs: usize, containers: usize, elapsed_ms: u128) {
        debug!(
            event = "poll_complete",
            source_url = %self.source_url,
            running_jobs = running_jobs,
            containers = containers,
            elapsed_ms = elapsed_ms,
            "Poll cycle complete"
        );
    }
}

/// Render an error with every distinct cause in its source chain
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        let message = e.to_string();
        if !chain.contains(&message) {
            chain.push_str(": ");
            chain.push_str(&message);
        }
        cause = e.source();
    }
    chain
}
