//! Augmented generation with a single direct fallback

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{GenerationBackend, HealthProbe};
use crate::errors::{RagError, Result};
use crate::orchestrator::state::{PipelineEvent, PipelineState, PipelineTrace, Route};
use crate::rag::{
    augment_prompt, parse_quiz, quiz_prompt, QuizQuestion, RetrievalPipeline, TrackPrompt,
};
use crate::types::{GenerationRequest, GenerationResponse};

/// Result of one orchestrated generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub response: GenerationResponse,
    /// Route that produced `response`
    pub route: Route,
    pub states: Vec<PipelineState>,
}

impl GenerationOutcome {
    /// Whether the augmented attempt was abandoned for direct generation
    pub fn fell_back(&self) -> bool {
        self.states.windows(2).any(|w| {
            w == [
                PipelineState::Generating(Route::Augmented),
                PipelineState::Generating(Route::Direct),
            ]
        })
    }
}

/// Sequences retrieval, augmentation and generation.
///
/// `primary` is the augmentation-capable target. With a retrieval pipeline
/// attached, retrieval and augmentation run here and `primary` receives the
/// augmented prompt; without one, `primary` receives track and top_k and
/// augments for itself. Direct generation goes to `fallback` when set, else
/// to `primary` with the original prompt.
pub struct FallbackOrchestrator {
    primary: Arc<dyn GenerationBackend>,
    fallback: Option<Arc<dyn GenerationBackend>>,
    gate: Option<Arc<dyn HealthProbe>>,
    retrieval: Option<Arc<RetrievalPipeline>>,
    fallback_model: Option<String>,
}

impl FallbackOrchestrator {
    pub fn new(primary: Arc<dyn GenerationBackend>) -> Self {
        Self {
            primary,
            fallback: None,
            gate: None,
            retrieval: None,
            fallback_model: None,
        }
    }

    /// Bare target for direct generation
    pub fn with_fallback(mut self, fallback: Arc<dyn GenerationBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Probe consulted before every augmented attempt
    pub fn with_gate(mut self, gate: Arc<dyn HealthProbe>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Retrieve and augment in process
    pub fn with_retrieval(mut self, retrieval: Arc<RetrievalPipeline>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Model used on the direct route
    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.generate_traced(request).await.map(|outcome| outcome.response)
    }

    /// Like `generate`, also reporting the route and the states visited
    pub async fn generate_traced(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let mut trace = PipelineTrace::new();

        if request.track.is_none() {
            trace.advance(PipelineEvent::DirectRequested)?;
            return self.run_direct(request, trace, None).await;
        }

        if let Some(gate) = &self.gate {
            if !gate.is_healthy().await {
                info!("ℹ️ RAG service not available, using direct generation");
                trace.advance(PipelineEvent::GateClosed)?;
                return self.run_direct(&request.without_augmentation(), trace, None).await;
            }
        }

        let attempt = match &self.retrieval {
            Some(pipeline) => self.run_local(pipeline, request, &mut trace).await?,
            None => {
                trace.advance(PipelineEvent::AugmentedRequested)?;
                self.primary.generate(request).await
            }
        };

        match attempt {
            Ok(response) => {
                trace.advance(PipelineEvent::Generated)?;
                Ok(GenerationOutcome {
                    response,
                    route: Route::Augmented,
                    states: trace.into_states(),
                })
            }
            Err(e) if e.triggers_fallback() && self.fallback.is_some() => {
                warn!(
                    backend = self.primary.name(),
                    error = %e,
                    "⚠️ Augmented generation failed, using direct generation"
                );
                trace.advance(PipelineEvent::FallbackTriggered)?;
                self.run_direct(&request.without_augmentation(), trace, Some(e)).await
            }
            Err(e) => {
                trace.advance(PipelineEvent::GenerationErrored)?;
                error!(kind = e.kind(), error = %e, "Augmented generation failed");
                Err(e)
            }
        }
    }

    /// Render the learning-module prompt for a track and generate it
    pub async fn generate_track_content(
        &self,
        prompt: &TrackPrompt,
        model: &str,
        use_rag: bool,
    ) -> Result<String> {
        Ok(self.generate(&prompt.request(model, use_rag)).await?.response)
    }

    /// One multiple-choice question about `content`, on the direct route
    pub async fn generate_quiz(&self, content: &str, model: &str) -> Result<QuizQuestion> {
        let request = GenerationRequest::new(model, quiz_prompt(content));
        let response = self.generate(&request).await?;
        parse_quiz(&response.response)
    }

    /// Retrieve, augment and hand the augmented prompt to `primary`.
    ///
    /// The outer `Result` carries failures that end the request; the inner
    /// one is the generation attempt.
    async fn run_local(
        &self,
        pipeline: &RetrievalPipeline,
        request: &GenerationRequest,
        trace: &mut PipelineTrace,
    ) -> Result<Result<GenerationResponse>> {
        trace.advance(PipelineEvent::RetrievalStarted)?;

        let retrieval = match pipeline
            .retrieve(request.track, &request.prompt, request.effective_top_k())
            .await
        {
            Ok(retrieval) => retrieval,
            Err(e) => {
                trace.advance(PipelineEvent::RetrievalFailed)?;
                error!(kind = e.kind(), error = %e, "Retrieval failed");
                return Err(e);
            }
        };
        trace.advance(PipelineEvent::Retrieved)?;

        let prompt = augment_prompt(&request.prompt, &retrieval.contents());
        trace.advance(PipelineEvent::PromptAssembled)?;
        debug!(references = retrieval.len(), chars = prompt.len(), "Prompt assembled");

        let augmented = GenerationRequest {
            prompt,
            ..request.without_augmentation()
        };

        Ok(self.primary.generate(&augmented).await.map(|mut response| {
            response.sources = retrieval.into_sources();
            response
        }))
    }

    async fn run_direct(
        &self,
        request: &GenerationRequest,
        mut trace: PipelineTrace,
        augmented_error: Option<RagError>,
    ) -> Result<GenerationOutcome> {
        let target = self.fallback.as_ref().unwrap_or(&self.primary);

        let mut request = request.clone();
        if let Some(model) = &self.fallback_model {
            request.model = model.clone();
        }

        match target.generate(&request).await {
            Ok(response) => {
                trace.advance(PipelineEvent::Generated)?;
                Ok(GenerationOutcome {
                    response,
                    route: Route::Direct,
                    states: trace.into_states(),
                })
            }
            Err(e) => {
                trace.advance(PipelineEvent::GenerationErrored)?;
                error!(
                    backend = target.name(),
                    kind = e.kind(),
                    error = %e,
                    "Direct generation failed"
                );
                Err(match augmented_error {
                    Some(augmented) => RagError::GenerationFailed {
                        augmented: augmented.to_string(),
                        source: Box::new(e),
                    },
                    None => e,
                })
            }
        }
    }
}
