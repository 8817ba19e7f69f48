//! Request/response types shared by the generation backends

use crate::types::Track;
use serde::{Deserialize, Serialize};

/// Number of reference documents retrieved when a request does not say
pub const DEFAULT_TOP_K: usize = 3;

/// Free-form document metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A generation request as sent to the augmentation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl GenerationRequest {
    /// Plain request without retrieval parameters
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            track: None,
            top_k: None,
        }
    }

    /// Request retrieval from `track` with the default top_k
    pub fn with_track(mut self, track: Track) -> Self {
        self.track = Some(track);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// top_k to use when retrieving for this request
    pub fn effective_top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Same model/prompt/stream with track and top_k removed
    pub fn without_augmentation(&self) -> Self {
        Self {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            stream: self.stream,
            track: None,
            top_k: None,
        }
    }
}

/// Preview of a retrieved document returned alongside a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub truncated: bool,
}

/// Completed generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_done")]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceCitation>>,
}

fn default_done() -> bool {
    true
}

impl GenerationResponse {
    /// Number of cited sources (0 when retrieval did not contribute)
    pub fn source_count(&self) -> usize {
        self.sources.as_ref().map_or(0, Vec::len)
    }
}

/// Sampling options forwarded to the bare generation backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 500,
        }
    }
}

/// Installed model as reported by the generation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl ModelInfo {
    /// Size in GiB for display
    pub fn size_gb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}
