//! HTTP surface of the augmentation service

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::{RagError, Result};
use crate::health::{HealthAggregator, HealthReport, StatsReport};
use crate::knowledge::KnowledgeStore;
use crate::orchestrator::FallbackOrchestrator;
use crate::rag::RetrievalPipeline;
use crate::service::api::{
    AddDocumentRequest, AddDocumentResponse, ErrorResponse, GenerateBody, ServiceInfo,
    StatusResponse,
};
use crate::streaming::{ClientTimeouts, OllamaClient};
use crate::types::{GenerationRequest, GenerationResponse, Track};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub store: Arc<KnowledgeStore>,
    pub health: Arc<HealthAggregator>,
    pub default_model: String,
    pub default_top_k: usize,
}

impl AppState {
    /// Wire store, retrieval and the generation client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(KnowledgeStore::from_config(
            &config.store,
            config.timeouts.store(),
        )?);

        let ollama = Arc::new(
            OllamaClient::with_config(&config.backends.ollama_url, &config.models.default)?
                .with_options(config.generation.options())
                .with_timeouts(ClientTimeouts {
                    probe: config.timeouts.probe(),
                    single_shot: config.timeouts.single_shot(),
                    stream: config.timeouts.stream(),
                }),
        );

        let retrieval = Arc::new(
            RetrievalPipeline::new(Arc::clone(&store))
                .with_preview_chars(config.generation.preview_chars),
        );
        let orchestrator = FallbackOrchestrator::new(ollama.clone()).with_retrieval(retrieval);
        let health = HealthAggregator::new(Arc::clone(&store))
            .with_probe("ollama", ollama)
            .with_timeout(config.timeouts.probe());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            store,
            health: Arc::new(health),
            default_model: config.models.default.clone(),
            default_top_k: config.generation.top_k,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/generate", post(generate))
        .route("/add_document", post(add_document))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/collection/:track", delete(clear_collection))
        .with_state(state)
}

/// Open every collection, then serve until the listener fails
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    state.store.init_all().await?;

    let addr = listener.local_addr()?;
    info!("🚀 RAG service listening on http://{}", addr);
    info!("📚 Available tracks: {}", Track::valid_names());

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn reject(err: RagError, unknown_track: StatusCode) -> ApiError {
    let status = match err {
        RagError::UnknownTrack { .. } => unknown_track,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<GenerationResponse> {
    let track = body
        .track
        .as_deref()
        .map(Track::parse)
        .transpose()
        .map_err(|e| reject(e, StatusCode::BAD_REQUEST))?;

    let model = body.model.unwrap_or_else(|| state.default_model.clone());
    info!(model = %model, track = ?track, "🤖 Generating");

    let request = GenerationRequest {
        model: model.clone(),
        prompt: body.prompt,
        stream: body.stream,
        track,
        top_k: Some(body.top_k.unwrap_or(state.default_top_k)),
    };

    match state.orchestrator.generate(&request).await {
        Ok(mut response) => {
            response.model = model;
            Ok(Json(response))
        }
        Err(e) => {
            error!(error = %e, "❌ Generation error");
            Err(reject(e, StatusCode::BAD_REQUEST))
        }
    }
}

async fn add_document(
    State(state): State<AppState>,
    Json(body): Json<AddDocumentRequest>,
) -> ApiResult<AddDocumentResponse> {
    let track = Track::parse(&body.track).map_err(|e| reject(e, StatusCode::BAD_REQUEST))?;

    let title = body
        .metadata
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or("Untitled")
        .to_string();

    let document_id = state
        .store
        .add(track, &body.content, body.metadata)
        .await
        .map_err(|e| {
            error!(error = %e, "❌ Error adding document");
            reject(e, StatusCode::BAD_REQUEST)
        })?;

    info!(track = %track, id = %document_id, "✅ Added document: {}", title);

    Ok(Json(AddDocumentResponse {
        status: "success".to_string(),
        message: format!("Document added to {} knowledge base", track),
        document_id,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.health().await)
}

async fn stats(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.health.stats().await)
}

async fn clear_collection(
    State(state): State<AppState>,
    Path(track): Path<String>,
) -> ApiResult<StatusResponse> {
    let parsed = Track::parse(&track).map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                detail: format!("Track '{}' not found", track),
            }),
        )
    })?;

    state
        .store
        .clear(parsed)
        .await
        .map_err(|e| reject(e, StatusCode::NOT_FOUND))?;

    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: format!("Collection '{}' cleared", parsed),
    }))
}

async fn service_info() -> Json<ServiceInfo> {
    let endpoints = [
        ("POST /generate", "Generate content with RAG"),
        ("POST /add_document", "Add document to knowledge base"),
        ("GET /health", "Health check"),
        ("GET /stats", "Get statistics"),
        ("DELETE /collection/{track}", "Clear collection"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ServiceInfo {
        service: "TrackRAG Service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
        tracks: Track::ALL.iter().map(|t| t.to_string()).collect(),
    })
}
