//! Retrieval → augmentation → generation, with direct fallback

pub mod fallback;
pub mod state;

pub use fallback::{FallbackOrchestrator, GenerationOutcome};
pub use state::{PipelineEvent, PipelineState, PipelineTrace, Route};
