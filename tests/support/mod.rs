//! In-process fake backends for integration tests
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use trackrag::embedding::HashingEmbedder;
use trackrag::health::HealthAggregator;
use trackrag::knowledge::{KnowledgeStore, LocalIndex};
use trackrag::orchestrator::FallbackOrchestrator;
use trackrag::rag::RetrievalPipeline;
use trackrag::service::{router, AppState};
use trackrag::streaming::OllamaClient;

pub const MODEL: &str = "llama3.2:3b";

/// Request bodies received by a fake, and its response streams still open
#[derive(Clone, Default)]
pub struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
    open_streams: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    /// Response bodies the server has not dropped yet
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn push(&self, body: Value) {
        self.bodies.lock().unwrap().push(body);
    }

    fn stream_opened(&self) -> OpenStream {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        OpenStream(Arc::clone(&self.open_streams))
    }
}

/// Decrements the open-stream count when the server drops the body
struct OpenStream(Arc<AtomicUsize>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bind an ephemeral port and serve `app` on it
pub async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[derive(Clone, Copy)]
pub enum OllamaBehavior {
    /// Answer with this text; streamed word by word when asked to stream
    Reply(&'static str),
    Status(u16),
    /// Stream fragments every few milliseconds and never finish
    Endless,
    /// Stream the text word by word, then close without a done fragment
    Truncated(&'static str),
}

#[derive(Clone)]
struct OllamaState {
    behavior: OllamaBehavior,
    recorder: Recorder,
}

pub async fn spawn_ollama(behavior: OllamaBehavior) -> (String, Recorder) {
    let recorder = Recorder::default();
    let state = OllamaState {
        behavior,
        recorder: recorder.clone(),
    };
    let app = Router::new()
        .route("/api/generate", post(ollama_generate))
        .route("/api/tags", get(ollama_tags))
        .with_state(state);
    (spawn(app).await, recorder)
}

async fn ollama_generate(State(state): State<OllamaState>, Json(body): Json<Value>) -> Response {
    state.recorder.push(body.clone());

    match state.behavior {
        OllamaBehavior::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"error": "model not loaded"})),
        )
            .into_response(),
        OllamaBehavior::Reply(text) if body["stream"] == true => {
            let mut lines = String::new();
            for word in text.split_inclusive(' ') {
                lines.push_str(&json!({"model": body["model"], "response": word, "done": false}).to_string());
                lines.push('\n');
            }
            lines.push_str(&json!({"model": body["model"], "response": "", "done": true, "context": [1, 2]}).to_string());
            lines.push('\n');
            // Never read by a well-behaved client
            lines.push_str("{\"response\":\" after done\",\"done\":false}\n");
            ([(header::CONTENT_TYPE, "application/x-ndjson")], lines).into_response()
        }
        OllamaBehavior::Endless => {
            let opened = state.recorder.stream_opened();
            let model = body["model"].clone();
            let ticks = futures_util::stream::unfold((opened, 0u64), move |(opened, n)| {
                let line = json!({"model": model, "response": format!("tick{} ", n), "done": false});
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let chunk = Bytes::from(format!("{}\n", line));
                    Some((Ok::<_, std::io::Error>(chunk), (opened, n + 1)))
                }
            });
            (
                [(header::CONTENT_TYPE, "application/x-ndjson")],
                Body::from_stream(ticks),
            )
                .into_response()
        }
        OllamaBehavior::Truncated(text) => {
            let mut lines = String::new();
            for word in text.split_inclusive(' ') {
                lines.push_str(&json!({"model": body["model"], "response": word, "done": false}).to_string());
                lines.push('\n');
            }
            ([(header::CONTENT_TYPE, "application/x-ndjson")], lines).into_response()
        }
        OllamaBehavior::Reply(text) => Json(json!({
            "model": body["model"],
            "response": text,
            "done": true,
            "context": [1, 2, 3]
        }))
        .into_response(),
    }
}

async fn ollama_tags() -> Json<Value> {
    Json(json!({
        "models": [
            {"name": "llama3.2:3b", "size": 2019393189u64, "modified_at": "2024-10-01T00:00:00Z"},
            {"name": "gpt-oss:20b", "size": 13780173734u64}
        ]
    }))
}

#[derive(Clone, Copy)]
pub enum RagBehavior {
    Reply(&'static str),
    Status(u16),
    /// 200 with a body that is not a generation response
    Garbage,
    /// Answers /health with 503
    Unhealthy,
    /// Reports itself degraded on /health but still serves /generate
    Degraded,
}

#[derive(Clone)]
struct RagState {
    behavior: RagBehavior,
    recorder: Recorder,
}

pub async fn spawn_rag(behavior: RagBehavior) -> (String, Recorder) {
    let recorder = Recorder::default();
    let state = RagState {
        behavior,
        recorder: recorder.clone(),
    };
    let app = Router::new()
        .route("/generate", post(rag_generate))
        .route("/health", get(rag_health))
        .with_state(state);
    (spawn(app).await, recorder)
}

async fn rag_generate(State(state): State<RagState>, Json(body): Json<Value>) -> Response {
    state.recorder.push(body.clone());

    match state.behavior {
        RagBehavior::Reply(text) => rag_reply(text, &body),
        RagBehavior::Unhealthy | RagBehavior::Degraded => rag_reply("degraded answer", &body),
        RagBehavior::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"detail": "vector store offline"})),
        )
            .into_response(),
        RagBehavior::Garbage => {
            ([(header::CONTENT_TYPE, "text/html")], "<html>502 Bad Gateway</html>").into_response()
        }
    }
}

fn rag_reply(text: &str, body: &Value) -> Response {
    Json(json!({
        "response": text,
        "model": body["model"],
        "done": true,
        "sources": [{"content": "SEER is the seasonal energy efficiency ratio...", "metadata": {"title": "Efficiency ratings"}}]
    }))
    .into_response()
}

async fn rag_health(State(state): State<RagState>) -> Response {
    match state.behavior {
        RagBehavior::Unhealthy => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy", "collections": {}})),
        )
            .into_response(),
        RagBehavior::Degraded => {
            Json(json!({"status": "degraded", "collections": {"hvac": 0, "nursing": -1}}))
                .into_response()
        }
        _ => Json(json!({"status": "healthy", "collections": {"hvac": 0}})).into_response(),
    }
}

/// A real RAG service over a temp-dir store and the given Ollama
pub struct TestService {
    pub url: String,
    pub store: Arc<KnowledgeStore>,
    temp: TempDir,
}

impl TestService {
    /// Directory holding the service's collection files
    pub fn data_dir(&self) -> &Path {
        self.temp.path()
    }
}

pub async fn spawn_service(ollama_url: &str) -> TestService {
    let temp = TempDir::new().unwrap();
    let index = Arc::new(LocalIndex::new(temp.path()).unwrap());
    let store = Arc::new(KnowledgeStore::new(index, Arc::new(HashingEmbedder::new(64))));

    let ollama = Arc::new(OllamaClient::with_config(ollama_url, MODEL).unwrap());
    let retrieval = Arc::new(RetrievalPipeline::new(Arc::clone(&store)));
    let orchestrator = FallbackOrchestrator::new(ollama.clone()).with_retrieval(retrieval);
    let health = HealthAggregator::new(Arc::clone(&store)).with_probe("ollama", ollama);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store: Arc::clone(&store),
        health: Arc::new(health),
        default_model: MODEL.to_string(),
        default_top_k: 3,
    };

    TestService {
        url: spawn(router(state)).await,
        store,
        temp,
    }
}
