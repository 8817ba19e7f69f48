//! Vector index seam
//!
//! A `VectorIndex` opens named collections; a `Collection` holds the vectors
//! of one track. The knowledge store supplies embeddings. The backend persists,
//! ranks, and numbers documents at write time so ids stay unique across
//! processes sharing one store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::errors::Result;
use crate::types::Metadata;

/// Identity a collection is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub embedding_function: String,
    pub dimension: usize,
}

/// Persisted description of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub embedding_function: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
}

impl CollectionInfo {
    pub fn from_spec(spec: &CollectionSpec) -> Self {
        Self {
            name: spec.name.clone(),
            embedding_function: spec.embedding_function.clone(),
            dimension: spec.dimension,
            created_at: Utc::now(),
        }
    }

    /// Whether an existing collection can serve `spec`
    pub fn is_compatible(&self, spec: &CollectionSpec) -> bool {
        self.dimension == spec.dimension && self.embedding_function == spec.embedding_function
    }
}

/// Document as handed to the index; the collection assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl NewDocument {
    /// Stored form with the sequence number the collection picked
    pub fn into_record(self, collection: &str, seq: u64) -> IndexRecord {
        IndexRecord {
            id: record_id(collection, seq),
            seq,
            content: self.content,
            metadata: self.metadata,
            embedding: self.embedding,
        }
    }
}

/// `<collection>_<seq>`
pub fn record_id(collection: &str, seq: u64) -> String {
    format!("{}_{}", collection, seq)
}

/// Document as stored by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    /// Insertion sequence, 1-based; breaks score ties
    pub seq: u64,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub seq: u64,
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Opens (or creates) collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend name, e.g. "local"
    fn backend(&self) -> &'static str;

    /// Where the data lives (directory or server URL)
    fn location(&self) -> String;

    /// Reuse the persisted collection for `spec`, or create it empty
    async fn open(&self, spec: &CollectionSpec) -> Result<Box<dyn Collection>>;
}

/// One track's vectors
#[async_trait]
pub trait Collection: Send + Sync {
    fn info(&self) -> &CollectionInfo;

    async fn count(&self) -> Result<usize>;

    /// Store `document` as number `count + 1`, returning its id.
    ///
    /// The count is read at write time, so two writers never get the same id.
    async fn append(&mut self, document: NewDocument) -> Result<String>;

    /// Up to `limit` hits in descending relevance
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// Replace the collection with an empty one of the same identity
    async fn reset(&mut self) -> Result<()>;
}

/// Descending score, ties broken by insertion order (lowest first)
pub fn sort_by_relevance(records: &mut [ScoredRecord]) {
    records.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.seq.cmp(&b.seq),
        other => other,
    });
}
