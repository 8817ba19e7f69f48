//! Ollama generation client
//!
//! Single-shot and incremental generation against `POST /api/generate`,
//! plus model listing and a reachability probe on `GET /api/tags`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{GenerationBackend, HealthProbe};
use crate::config::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use crate::errors::{RagError, Result};
use crate::streaming::parser::{decode_fragment, LineDecoder, StreamFragment};
use crate::types::{GenerationOptions, GenerationRequest, GenerationResponse, ModelInfo};

/// Lazily consumed generation fragments, ending at the first `done`
pub type FragmentStream = BoxStream<'static, Result<StreamFragment>>;

/// Per-call timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub probe: Duration,
    pub single_shot: Duration,
    pub stream: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(2),
            single_shot: Duration::from_secs(10),
            stream: Duration::from_secs(120),
        }
    }
}

/// Client for the bare generation backend
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
    timeouts: ClientTimeouts,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RagError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options: GenerationOptions::default(),
            timeouts: ClientTimeouts::default(),
        })
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Generate a complete response.
    ///
    /// A streaming request is consumed incrementally and collected.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        if request.stream {
            let fragments = self.generate_stream(request).await?;
            return collect_stream(fragments).await;
        }

        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.timeouts.single_shot)
            .json(&self.body(request, false))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await?;
        let body: OllamaGenerateResponse = serde_json::from_slice(&bytes)?;

        Ok(GenerationResponse {
            response: body.response,
            model: body.model,
            done: body.done,
            context: body.context,
            sources: None,
        })
    }

    /// Start an incremental generation.
    ///
    /// Dropping the returned stream closes the connection.
    pub async fn generate_stream(&self, request: &GenerationRequest) -> Result<FragmentStream> {
        let response = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.timeouts.stream)
            .json(&self.body(request, true))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        Ok(fragments(response.bytes_stream().boxed()))
    }

    /// List installed models
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.timeouts.single_shot)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await?;
        let models: ModelsResponse = serde_json::from_slice(&bytes)?;
        Ok(models.models)
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> OllamaGenerateRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        OllamaGenerateRequest {
            model,
            prompt: request.prompt.clone(),
            stream,
            options: self.options,
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        OllamaClient::generate(self, request).await
    }
}

#[async_trait]
impl HealthProbe for OllamaClient {
    async fn is_healthy(&self) -> bool {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.timeouts.probe)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Ollama probe failed");
                false
            }
        }
    }
}

/// Accumulate a fragment stream into one response
pub async fn collect_stream(mut fragments: FragmentStream) -> Result<GenerationResponse> {
    let mut collected = GenerationResponse {
        response: String::new(),
        model: String::new(),
        done: false,
        context: None,
        sources: None,
    };

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        collected.response.push_str(&fragment.response);
        if !fragment.model.is_empty() {
            collected.model = fragment.model;
        }
        if fragment.done {
            collected.done = true;
            collected.context = fragment.context;
            break;
        }
    }

    if !collected.done {
        warn!(chars = collected.response.len(), "Stream ended without a completion fragment");
    }
    Ok(collected)
}

struct FragmentState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    eof: bool,
    finished: bool,
}

/// Decode a byte stream into fragments, stopping after the first `done`
fn fragments(body: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let state = FragmentState {
        body,
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(line) = st.pending.pop_front() {
                if let Some(fragment) = decode_fragment(&line) {
                    st.finished = fragment.done;
                    return Some((Ok(fragment), st));
                }
                continue;
            }

            if st.eof {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => match st.decoder.push(&bytes) {
                    Ok(lines) => st.pending.extend(lines),
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.eof = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// Map a non-success status to `BackendError`, keeping the peer's message
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.error.or(b.detail))
        .unwrap_or(text);

    Err(RagError::BackendError {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    context: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}
