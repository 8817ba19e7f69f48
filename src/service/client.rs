//! Client for a running augmentation service

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{GenerationBackend, HealthProbe};
use crate::config::DEFAULT_RAG_URL;
use crate::errors::{RagError, Result};
use crate::health::{HealthReport, StatsReport};
use crate::service::api::{AddDocumentRequest, AddDocumentResponse, GenerateBody, StatusResponse};
use crate::streaming::client::ensure_success;
use crate::streaming::ClientTimeouts;
use crate::types::{GenerationRequest, GenerationResponse, Metadata, Track};

#[derive(Debug, Clone)]
pub struct RagServiceClient {
    client: Client,
    base_url: String,
    timeouts: ClientTimeouts,
}

impl RagServiceClient {
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_RAG_URL)
    }

    pub fn with_config(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RagError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts: ClientTimeouts {
                probe: std::time::Duration::from_secs(5),
                ..ClientTimeouts::default()
            },
        })
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Augmented generation.
    ///
    /// The service retrieves and generates before answering, so this call
    /// is bounded by the long generation timeout.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let response = self
            .client
            .post(self.url("/generate"))
            .timeout(self.timeouts.stream)
            .json(&GenerateBody::from(request))
            .send()
            .await?;
        decode(ensure_success(response).await?).await
    }

    pub async fn add_document(
        &self,
        track: Track,
        content: &str,
        metadata: Metadata,
    ) -> Result<AddDocumentResponse> {
        let body = AddDocumentRequest {
            track: track.to_string(),
            content: content.to_string(),
            metadata,
        };
        let response = self
            .client
            .post(self.url("/add_document"))
            .timeout(self.timeouts.single_shot)
            .json(&body)
            .send()
            .await?;
        decode(ensure_success(response).await?).await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.timeouts.probe)
            .send()
            .await?;
        decode(ensure_success(response).await?).await
    }

    pub async fn stats(&self) -> Result<StatsReport> {
        let response = self
            .client
            .get(self.url("/stats"))
            .timeout(self.timeouts.probe)
            .send()
            .await?;
        decode(ensure_success(response).await?).await
    }

    pub async fn clear_collection(&self, track: Track) -> Result<StatusResponse> {
        let response = self
            .client
            .delete(self.url(&format!("/collection/{}", track)))
            .timeout(self.timeouts.single_shot)
            .send()
            .await?;
        decode(ensure_success(response).await?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Strict body decode; any mismatch is a `DecodeError`
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl GenerationBackend for RagServiceClient {
    fn name(&self) -> &str {
        "rag-service"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        RagServiceClient::generate(self, request).await
    }
}

#[async_trait]
impl HealthProbe for RagServiceClient {
    async fn is_healthy(&self) -> bool {
        match self.health().await {
            Ok(report) => report.is_reachable(),
            Err(e) => {
                debug!(error = %e, "RAG service probe failed");
                false
            }
        }
    }
}
