//! Knowledge store
//!
//! Per-track vector collections behind a backend-agnostic index seam:
//! - `index`: the `VectorIndex` / `Collection` traits and record types
//! - `local`: JSON-file collections with atomic replacement
//! - `qdrant`: collections on a Qdrant server
//! - `store`: the per-track `KnowledgeStore` with lazy open and per-track locks

pub mod index;
pub mod local;
pub mod qdrant;
pub mod store;

pub use index::{
    Collection, CollectionInfo, CollectionSpec, IndexRecord, NewDocument, ScoredRecord, VectorIndex,
};
pub use local::LocalIndex;
pub use qdrant::QdrantIndex;
pub use store::{DocumentMatch, KnowledgeStore, DEFAULT_STORE_TIMEOUT};
