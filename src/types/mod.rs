//! Type definitions module
//!
//! Track identifiers and the request/response shapes exchanged with the
//! generation and augmentation backends.

pub mod generation;
pub mod track;

// Re-export commonly used types
pub use generation::{
    GenerationOptions, GenerationRequest, GenerationResponse, Metadata, ModelInfo,
    SourceCitation, DEFAULT_TOP_K,
};
pub use track::Track;
