//! Seams between the orchestrator and the services it calls

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{GenerationRequest, GenerationResponse};

/// Anything that turns a prompt into a completed response
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;
}

/// Reachability probe with a short, bounded timeout
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self) -> bool;
}
