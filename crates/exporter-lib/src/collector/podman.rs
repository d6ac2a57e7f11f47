//! Podman libpod API client

use super::{async_trait, ContainerSource};
use crate::error::PollError;
use crate::models::{decode_container_list, ContainerRecord};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Podman containers listing endpoint on the default API socket proxy
pub const DEFAULT_PODMAN_URL: &str = "http://127.0.0.1:8080/v3.4.2/libpod/containers/json";

/// Upper bound on a single listing request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Podman `containers/json` endpoint
pub struct PodmanClient {
    client: Client,
    url: String,
}

impl PodmanClient {
    /// Create a client for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ContainerSource for PodmanClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn list_containers(&self) -> Result<Vec<ContainerRecord>, PollError> {
        let unreachable = |source| PollError::Unreachable {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Unhealthy {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(unreachable)?;
        debug!(url = %self.url, bytes = body.len(), "Fetched container listing");

        decode_container_list(&body).map_err(|source| PollError::Malformed {
            url: self.url.clone(),
            source,
        })
    }
}
