//! Core data models for the exporter

use serde::{Deserialize, Deserializer, Serialize};

/// One entry of the Podman `containers/json` listing.
///
/// Only the image reference is interpreted; every other field of the
/// libpod response is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    #[serde(rename = "Image", default, deserialize_with = "null_as_empty")]
    pub image: String,
}

impl ContainerRecord {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

/// Decode a container listing body.
///
/// A `null` body is treated as an empty listing.
pub fn decode_container_list(body: &[u8]) -> serde_json::Result<Vec<ContainerRecord>> {
    let records: Option<Vec<ContainerRecord>> = serde_json::from_slice(body)?;
    Ok(records.unwrap_or_default())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}
