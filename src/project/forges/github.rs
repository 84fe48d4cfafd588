//! GitHub implementation of the forge client

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ForgeConfig;
use crate::project::error::ForgeError;
use crate::project::forge::{Endpoint, Forge, ForgeResponse};
use crate::project::gate::ConcurrencyGate;
use crate::project::types::ProjectKey;

/// Forge client for the GitHub REST API and raw file host
pub struct GitHubForge {
    client: reqwest::Client,
    release_url: String,
    tags_url: String,
    metadata_url: String,
    gate: Arc<ConcurrencyGate>,
}

impl GitHubForge {
    /// Creates a client for the endpoint templates in `config`.
    ///
    /// Every request first passes through `gate`.
    pub fn new(config: &ForgeConfig, gate: Arc<ConcurrencyGate>) -> Result<Self, ForgeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            release_url: config.release_url.clone(),
            tags_url: config.tags_url.clone(),
            metadata_url: config.metadata_url.clone(),
            gate,
        })
    }

    fn url_for(&self, endpoint: Endpoint, project: &ProjectKey) -> String {
        let template = match endpoint {
            Endpoint::Release => &self.release_url,
            Endpoint::Tags => &self.tags_url,
            Endpoint::MetadataFile => &self.metadata_url,
        };
        template
            .replace("{owner}", &project.owner)
            .replace("{repo}", &project.repo)
    }
}

#[async_trait::async_trait]
impl Forge for GitHubForge {
    async fn fetch(&self, endpoint: Endpoint, project: &ProjectKey) -> ForgeResponse {
        let url = self.url_for(endpoint, project);

        let Ok(_pass) = self.gate.enter().await else {
            warn!("Concurrency gate closed, not requesting {}", url);
            return ForgeResponse::transport_failure();
        };

        debug!("Fetching {} for {}: {}", endpoint.as_str(), project, url);
        let response = match self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                return ForgeResponse::transport_failure();
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => {
                debug!("{} returned status {}", url, status);
                ForgeResponse::from_bytes(status, &body)
            }
            Err(e) => {
                warn!("Failed to read response body from {}: {}", url, e);
                ForgeResponse::transport_failure()
            }
        }
    }
}
