//! trackrag - track-scoped retrieval-augmented generation
//!
//! Retrieves reference documents from a per-track vector knowledge base,
//! folds them into the prompt sent to an Ollama backend, and degrades to
//! direct generation when the augmented path is unavailable.
//!
//! # Architecture
//!
//! - **knowledge**: one collection per track over a local or Qdrant index
//! - **rag**: retrieval with citation previews and prompt augmentation
//! - **streaming**: Ollama client, single-shot and line-streamed
//! - **orchestrator**: the retrieval → augmentation → generation state machine
//! - **health**: bounded health and statistics reports
//! - **service**: the HTTP RAG service and its client

pub mod backend;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod health;
pub mod knowledge;
pub mod orchestrator;
pub mod rag;
pub mod service;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use backend::{GenerationBackend, HealthProbe};
pub use errors::{RagError, Result};
pub use orchestrator::FallbackOrchestrator;
pub use types::{GenerationRequest, GenerationResponse, Track};
