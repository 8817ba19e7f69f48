//! Generation pipeline state machine
//!
//! Deterministic transitions for one request:
//! - Safety: only the edges listed in `transition` exist
//! - Liveness: every path ends in `Done` or `Failed`
//! - `Failed` follows a generation attempt only when no fallback remains

use crate::errors::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which backend configuration a generation attempt targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Augmentation-capable target, with track/top_k or an augmented prompt
    Augmented,
    /// Bare generation target with the original prompt
    Direct,
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Retrieving,
    Augmenting,
    Generating(Route),
    /// Terminal: response produced
    Done,
    /// Terminal: no generation attempt left
    Failed,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Augmentation not requested or no track
    DirectRequested,
    /// Augmentation backend failed its health probe
    GateClosed,
    /// Retrieval runs in process
    RetrievalStarted,
    /// Remote augmentation backend retrieves for itself
    AugmentedRequested,
    Retrieved,
    RetrievalFailed,
    PromptAssembled,
    Generated,
    /// Augmented attempt failed with an error that allows fallback
    FallbackTriggered,
    GenerationErrored,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1.  Idle                  → Generating(Direct)     (DirectRequested | GateClosed)
    /// 2.  Idle                  → Retrieving             (RetrievalStarted)
    /// 3.  Idle                  → Generating(Augmented)  (AugmentedRequested)
    /// 4.  Retrieving            → Augmenting             (Retrieved)
    /// 5.  Retrieving            → Failed                 (RetrievalFailed)
    /// 6.  Augmenting            → Generating(Augmented)  (PromptAssembled)
    /// 7.  Generating(_)         → Done                   (Generated)
    /// 8.  Generating(Augmented) → Generating(Direct)     (FallbackTriggered)
    /// 9.  Generating(_)         → Failed                 (GenerationErrored)
    pub fn transition(&self, event: PipelineEvent) -> Result<PipelineState> {
        use PipelineEvent::*;
        use PipelineState::*;

        let next_state = match (self, event) {
            (Idle, DirectRequested) | (Idle, GateClosed) => Generating(Route::Direct),
            (Idle, RetrievalStarted) => Retrieving,
            (Idle, AugmentedRequested) => Generating(Route::Augmented),

            (Retrieving, Retrieved) => Augmenting,
            (Retrieving, RetrievalFailed) => Failed,

            (Augmenting, PromptAssembled) => Generating(Route::Augmented),

            (Generating(_), Generated) => Done,
            (Generating(Route::Augmented), FallbackTriggered) => Generating(Route::Direct),
            (Generating(_), GenerationErrored) => Failed,

            (from, event) => {
                return Err(RagError::InvalidTransition {
                    from: from.to_string(),
                    event: format!("{:?}", event),
                });
            }
        };

        Ok(next_state)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Retrieving => write!(f, "retrieving"),
            PipelineState::Augmenting => write!(f, "augmenting"),
            PipelineState::Generating(Route::Augmented) => write!(f, "generating(augmented)"),
            PipelineState::Generating(Route::Direct) => write!(f, "generating(direct)"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// States visited by one request, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTrace {
    states: Vec<PipelineState>,
}

impl PipelineTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn advance(&mut self, event: PipelineEvent) -> Result<PipelineState> {
        let next = self.current().transition(event)?;
        self.states.push(next);
        Ok(next)
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<PipelineState> {
        self.states
    }
}

impl Default for PipelineTrace {
    fn default() -> Self {
        Self::new()
    }
}
