//! Forge trait for fetching project data from a code-hosting service

#[cfg(test)]
use mockall::automock;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::project::types::ProjectKey;

/// Status reported when a request never produced an HTTP response
/// (transport error, timeout, or a closed concurrency gate)
pub const TRANSPORT_FAILURE: u16 = 0;

/// Forge endpoints consulted by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Latest published release
    Release,
    /// Tags, newest first
    Tags,
    /// Optional per-project metadata file
    MetadataFile,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Release => "release",
            Endpoint::Tags => "tags",
            Endpoint::MetadataFile => "metadata_file",
        }
    }
}

/// Response body, parsed as JSON when possible
#[derive(Debug, Clone, PartialEq)]
pub enum ForgeBody {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForgeResponse {
    pub status: u16,
    pub body: ForgeBody,
}

impl ForgeResponse {
    pub fn new(status: u16, body: ForgeBody) -> Self {
        Self { status, body }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status, ForgeBody::Json(value))
    }

    pub fn transport_failure() -> Self {
        Self::new(TRANSPORT_FAILURE, ForgeBody::Text(String::new()))
    }

    /// Builds a response from raw body bytes, keeping non-JSON bodies as text
    pub fn from_bytes(status: u16, bytes: &[u8]) -> Self {
        let body = match serde_json::from_slice(bytes) {
            Ok(value) => ForgeBody::Json(value),
            Err(_) => ForgeBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        };
        Self::new(status, body)
    }

    /// Reads the body as a typed record; `None` for text or mismatched JSON
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        match &self.body {
            ForgeBody::Json(value) => T::deserialize(value).ok(),
            ForgeBody::Text(_) => None,
        }
    }
}

/// Response from the latest-release endpoint
#[derive(Debug, Default, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Release {
    /// The release's tag, falling back to its name
    pub fn version_tag(&self) -> Option<&str> {
        [&self.tag_name, &self.name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|tag| !tag.is_empty())
    }
}

/// One element of the tags endpoint response
#[derive(Debug, Default, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-project metadata file published by the project's authors
#[derive(Debug, Default, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub bad_versions: Option<Vec<String>>,
}

/// Remove a single leading `v` from a tag.
///
/// This is a literal prefix strip, not a semver parse.
pub fn strip_v(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Trait for fetching project data from a forge
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Forge: Send + Sync {
    /// Performs a single request against `endpoint` for `project`.
    ///
    /// Never fails: transport errors are reported with status [`TRANSPORT_FAILURE`].
    async fn fetch(&self, endpoint: Endpoint, project: &ProjectKey) -> ForgeResponse;
}
