//! Container polling and job counting
//!
//! This module polls the container runtime for its container listing,
//! counts the containers running Nosana images and publishes the result
//! into the exporter's metric store on a fixed schedule.

mod cycle;
mod r#loop;
mod podman;

#[cfg(test)]
mod tests;

pub use cycle::{Collector, CycleOutcome, ImageFilter, ImageRetention, DEFAULT_IMAGE_PATTERN};
pub use podman::{PodmanClient, DEFAULT_PODMAN_URL, DEFAULT_REQUEST_TIMEOUT};
pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder};

use crate::error::PollError;
use crate::models::ContainerRecord;

pub use async_trait::async_trait;

/// Source of container listings
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// URL or name identifying the source, used in logs
    fn endpoint(&self) -> &str;

    /// Fetch the current container listing
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, PollError>;
}
