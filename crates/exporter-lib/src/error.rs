//! Errors raised while polling the container runtime

use thiserror::Error;

/// Failure of a single poll against the container runtime API
#[derive(Debug, Error)]
pub enum PollError {
    /// The request never produced a usable response
    #[error("error accessing URL {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The runtime answered with a non-success status
    #[error("URL {url} returned non-success status code {status}")]
    Unhealthy { url: String, status: u16 },

    /// The body was not a JSON container listing
    #[error("error decoding container list from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PollError {
    /// Label value used for the poll error counter
    pub fn reason(&self) -> &'static str {
        match self {
            PollError::Unreachable { .. } => "unreachable",
            PollError::Unhealthy { .. } => "unhealthy",
            PollError::Malformed { .. } => "malformed",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PollError::Unreachable { url, .. }
            | PollError::Unhealthy { url, .. }
            | PollError::Malformed { url, .. } => url,
        }
    }
}
