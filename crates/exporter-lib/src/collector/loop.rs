//! Poll loop
//!
//! Drives the collector at a fixed interval until shutdown is signalled.
//! Cycles run strictly one after another; a failed cycle never stops the loop.

use super::{Collector, CycleOutcome};
use crate::health::{components, HealthRegistry};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between the starts of consecutive cycles (default: 5 minutes)
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Periodic driver for a [`Collector`]
pub struct PollLoop {
    collector: Arc<Collector>,
    config: PollConfig,
    health: Option<HealthRegistry>,
}

impl PollLoop {
    pub fn new(collector: Arc<Collector>, config: PollConfig) -> Self {
        Self {
            collector,
            config,
            health: None,
        }
    }

    /// Run the first cycle immediately, then one per interval, until
    /// `shutdown` fires or its sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting poll loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.collector.run_cycle().await;
                    cycle_count += 1;
                    debug!(
                        cycle = cycle_count,
                        success = outcome.is_success(),
                        running_jobs = outcome.running_jobs(),
                        "Poll cycle finished"
                    );
                    self.record_health(&outcome).await;
                }
                _ = shutdown.recv() => {
                    info!(cycles = cycle_count, "Shutting down poll loop");
                    break;
                }
            }
        }
    }

    async fn record_health(&self, outcome: &CycleOutcome) {
        let Some(health) = &self.health else {
            return;
        };

        match outcome {
            CycleOutcome::Completed { .. } => health.record_success(components::COLLECTOR).await,
            CycleOutcome::Failed(e) => {
                health
                    .record_failure(components::COLLECTOR, e.to_string())
                    .await
            }
        }
    }
}

/// Builder for creating the poll loop
#[derive(Default)]
pub struct PollLoopBuilder {
    collector: Option<Arc<Collector>>,
    health: Option<HealthRegistry>,
    config: PollConfig,
}

impl PollLoopBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collector(mut self, collector: Arc<Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Set the poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Report cycle outcomes to a health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<PollLoop> {
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Collector is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }

        Ok(PollLoop {
            collector,
            config: self.config,
            health: self.health,
        })
    }
}
