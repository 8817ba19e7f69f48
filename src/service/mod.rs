//! Augmentation service: HTTP server and its client

pub mod api;
pub mod client;
pub mod server;

pub use api::{AddDocumentRequest, AddDocumentResponse, ErrorResponse, GenerateBody, StatusResponse};
pub use client::RagServiceClient;
pub use server::{router, serve, AppState};
