//! Wire types of the augmentation service

use serde::{Deserialize, Serialize};

use crate::types::{GenerationRequest, Metadata, DEFAULT_TOP_K};

/// `POST /generate` body as received.
///
/// The track stays a string so an unknown name can be answered with a
/// client error instead of a body rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl From<&GenerationRequest> for GenerateBody {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            model: Some(request.model.clone()),
            prompt: request.prompt.clone(),
            stream: request.stream,
            track: request.track.map(|t| t.to_string()),
            top_k: Some(request.top_k.unwrap_or(DEFAULT_TOP_K)),
        }
    }
}

/// `POST /add_document` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDocumentRequest {
    pub track: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddDocumentResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub document_id: String,
}

/// Body of simple acknowledgements such as `DELETE /collection/{track}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// `GET /` service description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: std::collections::BTreeMap<String, String>,
    pub tracks: Vec<String>,
}
