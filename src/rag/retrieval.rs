//! Track-scoped retrieval with citation previews

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_PREVIEW_CHARS;
use crate::errors::Result;
use crate::knowledge::{DocumentMatch, KnowledgeStore};
use crate::types::{SourceCitation, Track};

/// Documents retrieved for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    /// Full documents in rank order, used for augmentation
    pub documents: Vec<DocumentMatch>,
    /// Truncated previews of `documents`, returned to the caller
    pub sources: Vec<SourceCitation>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Full document texts in rank order
    pub fn contents(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.content.as_str()).collect()
    }

    /// Citations, or `None` when retrieval contributed nothing
    pub fn into_sources(self) -> Option<Vec<SourceCitation>> {
        if self.sources.is_empty() {
            None
        } else {
            Some(self.sources)
        }
    }
}

/// Turns (track, prompt, top_k) into ranked references
pub struct RetrievalPipeline {
    store: Arc<KnowledgeStore>,
    preview_chars: usize,
}

impl RetrievalPipeline {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Retrieve up to `top_k` documents from `track`.
    ///
    /// No track means no retrieval. An empty collection yields an empty
    /// result. Store failures propagate.
    pub async fn retrieve(
        &self,
        track: Option<Track>,
        query: &str,
        top_k: usize,
    ) -> Result<Retrieval> {
        let Some(track) = track else {
            debug!("No track requested, skipping retrieval");
            return Ok(Retrieval::default());
        };

        let documents = self.store.query(track, query, top_k).await?;
        if documents.is_empty() {
            warn!(track = %track, "No documents in collection");
            return Ok(Retrieval::default());
        }

        info!(track = %track, documents = documents.len(), "Retrieved documents");

        let sources = documents
            .iter()
            .map(|doc| citation(doc, self.preview_chars))
            .collect();

        Ok(Retrieval { documents, sources })
    }
}

fn citation(doc: &DocumentMatch, preview_chars: usize) -> SourceCitation {
    let (content, truncated) = preview(&doc.content, preview_chars);
    SourceCitation {
        content,
        metadata: doc.metadata.clone(),
        truncated,
    }
}

/// First `max_chars` characters of `text`, with "..." appended when cut
pub fn preview(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => (format!("{}...", &text[..cut]), true),
        None => (text.to_string(), false),
    }
}
