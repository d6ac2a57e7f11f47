//! A single poll cycle: fetch, filter, publish

use super::ContainerSource;
use crate::error::PollError;
use crate::observability::{ExporterMetrics, StructuredLogger};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// Path segment identifying Nosana job images
pub const DEFAULT_IMAGE_PATTERN: &str = "/nosana/";

/// Literal, case-sensitive substring match on image references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    pattern: String,
}

impl ImageFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, image: &str) -> bool {
        image.contains(&self.pattern)
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_PATTERN)
    }
}

/// What happens to presence series of images that stop matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageRetention {
    /// Series stay at 1 for the life of the process
    #[default]
    Retain,
    /// Series absent from the latest successful cycle are removed
    ExpireStale,
}

/// Result of one poll cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// The listing was fetched; `running_jobs` containers matched
    Completed {
        running_jobs: usize,
        containers: usize,
    },
    /// The poll failed and the running job gauge was reset to zero
    Failed(PollError),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }

    pub fn running_jobs(&self) -> usize {
        match self {
            CycleOutcome::Completed { running_jobs, .. } => *running_jobs,
            CycleOutcome::Failed(_) => 0,
        }
    }
}

/// Runs poll cycles against a container source and publishes the results
pub struct Collector {
    source: Arc<dyn ContainerSource>,
    filter: ImageFilter,
    retention: ImageRetention,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
}

impl Collector {
    pub fn new(source: Arc<dyn ContainerSource>, metrics: ExporterMetrics) -> Self {
        let logger = StructuredLogger::new(source.endpoint());
        Self {
            source,
            filter: ImageFilter::default(),
            retention: ImageRetention::default(),
            metrics,
            logger,
        }
    }

    pub fn with_filter(mut self, filter: ImageFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_retention(mut self, retention: ImageRetention) -> Self {
        self.retention = retention;
        self
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Run one poll cycle.
    ///
    /// Failures are logged and reset the running job gauge to zero; image
    /// presence is only touched when the listing was decoded.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let start = Instant::now();
        let result = self.source.list_containers().await;
        self.metrics
            .observe_poll_duration(start.elapsed().as_secs_f64());

        let containers = match result {
            Ok(containers) => containers,
            Err(e) => {
                self.logger.log_poll_failure(&e);
                self.metrics.inc_poll_errors(e.reason());
                self.metrics.set_running_jobs(0);
                return CycleOutcome::Failed(e);
            }
        };

        let mut running_jobs = 0;
        let mut seen = HashSet::new();
        for container in containers.iter().filter(|c| self.filter.matches(&c.image)) {
            running_jobs += 1;
            self.metrics.mark_image_present(&container.image);
            self.logger.log_image_found(&container.image);
            seen.insert(container.image.clone());
        }
        self.metrics.set_running_jobs(running_jobs);

        if self.retention == ImageRetention::ExpireStale {
            let removed = self.metrics.expire_images_except(&seen);
            if removed > 0 {
                tracing::info!(removed = removed, "Expired presence of images no longer running");
            }
        }

        self.logger.log_poll_complete(
            running_jobs,
            containers.len(),
            start.elapsed().as_millis(),
        );

        CycleOutcome::Completed {
            running_jobs,
            containers: containers.len(),
        }
    }
}
