//! Library for the Nosana container exporter
//!
//! This crate provides the core functionality for:
//! - Polling the Podman containers API
//! - Counting containers that run Nosana job images
//! - Publishing the counts as Prometheus metrics
//! - Health checks and default bind address resolution

pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod netaddr;
pub mod observability;

pub use error::PollError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
