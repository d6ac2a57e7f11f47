//! Exporter configuration
//!
//! Values come from computed defaults, then `EXPORTER_*` environment
//! variables, then command line flags.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::collector::{
    ImageFilter, ImageRetention, DEFAULT_IMAGE_PATTERN, DEFAULT_PODMAN_URL,
};
use exporter_lib::netaddr;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Prometheus exporter for Nosana job containers
#[derive(Debug, Default, Parser)]
#[command(name = "nosana-exporter")]
#[command(author, version, about = "Prometheus exporter for Nosana job containers", long_about = None)]
pub struct Cli {
    /// URL for Podman API
    #[arg(long)]
    pub podman_url: Option<String>,

    /// Server address (defaults to the first non-loopback IPv4 address)
    #[arg(long)]
    pub server_address: Option<String>,

    /// Server port
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Seconds between polls of the Podman API
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Timeout in seconds for a single Podman API request
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Substring an image reference must contain to count as a job
    #[arg(long)]
    pub image_pattern: Option<String>,

    /// Drop image series that were not seen in the latest successful poll
    #[arg(long)]
    pub expire_stale_images: bool,
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Podman containers listing endpoint
    #[serde(default = "default_podman_url")]
    pub podman_url: String,

    /// Address the metrics server binds to; empty binds all interfaces
    #[serde(default = "netaddr::default_bind_address")]
    pub server_address: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_image_pattern")]
    pub image_pattern: String,

    #[serde(default)]
    pub expire_stale_images: bool,
}

fn default_podman_url() -> String {
    DEFAULT_PODMAN_URL.to_string()
}

fn default_server_port() -> u16 {
    8995
}

fn default_poll_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_image_pattern() -> String {
    DEFAULT_IMAGE_PATTERN.to_string()
}

impl ExporterConfig {
    /// Load configuration from the environment, apply command line
    /// overrides and validate the result
    pub fn load(cli: Cli) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER"))
            .build()
            .context("Failed to read environment configuration")?;

        let config: ExporterConfig = config
            .try_deserialize()
            .context("Invalid environment configuration")?;

        let config = config.with_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply command line flags on top of the loaded values
    pub fn with_overrides(mut self, cli: Cli) -> Self {
        if let Some(url) = cli.podman_url {
            self.podman_url = url;
        }
        if let Some(address) = cli.server_address {
            self.server_address = address;
        }
        if let Some(port) = cli.server_port {
            self.server_port = port;
        }
        if let Some(secs) = cli.poll_interval_secs {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = cli.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(pattern) = cli.image_pattern {
            self.image_pattern = pattern;
        }
        self.expire_stale_images |= cli.expire_stale_images;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.podman_url)
            .with_context(|| format!("Invalid Podman URL: {}", self.podman_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Podman URL must use http or https: {}", self.podman_url);
        }
        if self.server_port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be at least one second");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be at least one second");
        }
        if self.image_pattern.is_empty() {
            anyhow::bail!("Image pattern must not be empty");
        }
        Ok(())
    }

    /// `address:port` the metrics server listens on
    pub fn listen_address(&self) -> String {
        let address = self.server_address.trim();
        if address.is_empty() {
            return format!("0.0.0.0:{}", self.server_port);
        }
        match address.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.server_port).to_string(),
            Err(_) => format!("{}:{}", address, self.server_port),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn image_filter(&self) -> ImageFilter {
        ImageFilter::new(self.image_pattern.clone())
    }

    pub fn image_retention(&self) -> ImageRetention {
        if self.expire_stale_images {
            ImageRetention::ExpireStale
        } else {
            ImageRetention::Retain
        }
    }
}
