//! Per-track knowledge store
//!
//! Owns one collection per track. Collections are opened lazily on first
//! access. Each track has its own lock: reads on a track share it, `add` and
//! `clear` take it exclusively, and unrelated tracks never contend. Ids are
//! assigned by the collection at write time, so several stores over one data
//! directory never hand out the same id.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::config::{EmbedderKind, IndexBackend, StoreConfig};
use crate::embedding::{Embedder, HashingEmbedder, MiniLmEmbedder};
use crate::errors::{RagError, Result};
use crate::knowledge::index::{Collection, CollectionInfo, CollectionSpec, NewDocument, VectorIndex};
use crate::knowledge::local::LocalIndex;
use crate::knowledge::qdrant::QdrantIndex;
use crate::types::{Metadata, Track};

/// Default bound on a read, or on waiting for a track before a write
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ranked match returned by `KnowledgeStore::query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// 1-based position in the result
    pub rank: usize,
    pub score: f32,
}

type SlotContents = Option<Box<dyn Collection>>;
type Slot = RwLock<SlotContents>;

/// Knowledge store with one lazily opened collection per track
pub struct KnowledgeStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    slots: [Slot; Track::COUNT],
    timeout: Duration,
}

impl KnowledgeStore {
    /// Create a store over `index`, embedding with `embedder`
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            slots: std::array::from_fn(|_| RwLock::new(None)),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the per-operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build embedder and index from configuration
    pub fn from_config(config: &StoreConfig, timeout: Duration) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match config.embedder {
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.hashing_dimension)),
            EmbedderKind::MiniLm => Arc::new(MiniLmEmbedder::new()?),
        };

        let index: Arc<dyn VectorIndex> = match config.backend {
            IndexBackend::Local => Arc::new(LocalIndex::new(&config.data_dir)?),
            IndexBackend::Qdrant => Arc::new(QdrantIndex::new(&config.qdrant_url)?),
        };

        info!(
            backend = index.backend(),
            location = %index.location(),
            embedder = embedder.name(),
            dimension = embedder.dimension(),
            "Knowledge store configured"
        );

        Ok(Self::new(index, embedder).with_timeout(timeout))
    }

    /// Identity of the embedding function used for every collection
    pub fn embedding_function(&self) -> &str {
        self.embedder.name()
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Backend location (directory or server URL)
    pub fn location(&self) -> String {
        self.index.location()
    }

    /// Open every track's collection, logging its size
    pub async fn init_all(&self) -> Result<()> {
        for track in Track::ALL {
            let count = self.count(track).await?;
            info!(track = %track, documents = count, "Collection ready");
        }
        Ok(())
    }

    /// The track's collection, created empty if it does not exist yet
    pub async fn ensure(&self, track: Track) -> Result<CollectionInfo> {
        self.bounded(async {
            let guard = self.read_slot(track).await?;
            Ok(collection(&guard, track)?.info().clone())
        })
        .await
    }

    /// Embed and append a document, returning its id.
    ///
    /// Only waiting for the track is bounded by the store timeout. Once the
    /// write has started it runs to completion, so an `Err` always means the
    /// document was not stored.
    pub async fn add(&self, track: Track, content: &str, metadata: Metadata) -> Result<String> {
        let embedding = self.embed(content).await?;

        let mut guard = self.bounded(self.write_slot(track)).await?;
        let id = collection_mut(&mut guard, track)?
            .append(NewDocument {
                content: content.to_string(),
                metadata,
                embedding,
            })
            .await?;

        debug!(track = %track, id = %id, "Document added");
        Ok(id)
    }

    /// Up to `min(top_k, count)` matches in descending relevance
    pub async fn query(
        &self,
        track: Track,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<DocumentMatch>> {
        self.bounded(async {
            let guard = self.read_slot(track).await?;
            let collection = collection(&guard, track)?;

            let count = collection.count().await?;
            if count == 0 || top_k == 0 {
                return Ok(Vec::new());
            }

            let vector = self.embed(text).await?;
            let limit = top_k.min(count);
            let mut hits = collection.search(&vector, limit).await?;
            hits.truncate(limit);

            Ok(hits
                .into_iter()
                .enumerate()
                .map(|(i, hit)| DocumentMatch {
                    id: hit.id,
                    content: hit.content,
                    metadata: hit.metadata,
                    rank: i + 1,
                    score: hit.score,
                })
                .collect())
        })
        .await
    }

    /// Number of documents in the track's collection
    pub async fn count(&self, track: Track) -> Result<usize> {
        self.bounded(async {
            let guard = self.read_slot(track).await?;
            collection(&guard, track)?.count().await
        })
        .await
    }

    /// Replace the track's collection with an empty one.
    ///
    /// Bounded like `add`: the timeout covers waiting for the track only.
    pub async fn clear(&self, track: Track) -> Result<()> {
        let mut guard = self.bounded(self.write_slot(track)).await?;
        collection_mut(&mut guard, track)?.reset().await?;
        info!(track = %track, "Collection cleared");
        Ok(())
    }

    fn spec(&self, track: Track) -> CollectionSpec {
        CollectionSpec {
            name: track.as_str().to_string(),
            embedding_function: self.embedder.name().to_string(),
            dimension: self.embedder.dimension(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Embedding task failed: {}", e)))?
    }

    async fn read_slot(&self, track: Track) -> Result<RwLockReadGuard<'_, SlotContents>> {
        let slot = &self.slots[track.index()];
        {
            let guard = slot.read().await;
            if guard.is_some() {
                return Ok(guard);
            }
        }
        let guard = self.write_slot(track).await?;
        Ok(guard.downgrade())
    }

    async fn write_slot(&self, track: Track) -> Result<RwLockWriteGuard<'_, SlotContents>> {
        let mut guard = self.slots[track.index()].write().await;
        if guard.is_none() {
            *guard = Some(self.index.open(&self.spec(track)).await?);
        }
        Ok(guard)
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op).await.map_err(|_| {
            RagError::StoreUnavailable(format!(
                "Store operation timed out after {}ms",
                self.timeout.as_millis()
            ))
        })?
    }
}

fn collection<'a>(
    slot: &'a Option<Box<dyn Collection>>,
    track: Track,
) -> Result<&'a dyn Collection> {
    slot.as_deref()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Collection '{}' is not open", track)))
}

fn collection_mut<'a>(
    slot: &'a mut Option<Box<dyn Collection>>,
    track: Track,
) -> Result<&'a mut Box<dyn Collection>> {
    slot.as_mut()
        .ok_or_else(|| RagError::StoreUnavailable(format!("Collection '{}' is not open", track)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::index::ScoredRecord;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> KnowledgeStore {
        let index = Arc::new(LocalIndex::new(temp.path()).unwrap());
        KnowledgeStore::new(index, Arc::new(HashingEmbedder::new(128)))
    }

    fn meta(title: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("title".to_string(), json!(title));
        m
    }

    #[tokio::test]
    async fn test_ensure_creates_empty_collection() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let info = store.ensure(Track::Hvac).await.unwrap();
        assert_eq!(info.name, "hvac");
        assert_eq!(info.dimension, 128);
        assert_eq!(store.count(Track::Hvac).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ids_follow_collection_size() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let first = store.add(Track::Nursing, "Hand hygiene", meta("a")).await.unwrap();
        let second = store.add(Track::Nursing, "Vital signs", meta("b")).await.unwrap();
        assert_eq!(first, "nursing_1");
        assert_eq!(second, "nursing_2");
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let results = store.query(Track::Hvac, "What is a SEER rating?", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_bounded_by_count() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.add(Track::Nursing, "Hand hygiene before patient contact", meta("a")).await.unwrap();
        store.add(Track::Nursing, "Recording blood pressure", meta("b")).await.unwrap();

        let results = store.query(Track::Nursing, "patient care", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
    }

    #[tokio::test]
    async fn test_top_match_is_added_document() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .add(Track::Hvac, "Refrigerant charging with manifold gauges", meta("a"))
            .await
            .unwrap();
        store.add(Track::Hvac, "Thermostat wiring for heat pumps", meta("b")).await.unwrap();
        store.add(Track::Hvac, "Duct sizing and static pressure", meta("c")).await.unwrap();

        let results = store
            .query(Track::Hvac, "Thermostat wiring for heat pumps", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "hvac_2");
        assert_eq!(results[0].metadata["title"], "b");
    }

    #[tokio::test]
    async fn test_tracks_are_isolated() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.add(Track::Spiritual, "Daily prayer", Metadata::new()).await.unwrap();
        assert_eq!(store.count(Track::Spiritual).await.unwrap(), 1);
        assert_eq!(store.count(Track::MentalHealth).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_resets_ids() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.add(Track::Hvac, "one", Metadata::new()).await.unwrap();
        store.add(Track::Hvac, "two", Metadata::new()).await.unwrap();
        store.clear(Track::Hvac).await.unwrap();

        assert_eq!(store.count(Track::Hvac).await.unwrap(), 0);
        let id = store.add(Track::Hvac, "three", Metadata::new()).await.unwrap();
        assert_eq!(id, "hvac_1");
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_ids() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(store(&temp));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add(Track::Hvac, &format!("doc {}", i), Metadata::new()).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.count(Track::Hvac).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_two_stores_over_one_directory_share_numbering() {
        let temp = TempDir::new().unwrap();
        let cli = store(&temp);
        let service = store(&temp);
        service.ensure(Track::Hvac).await.unwrap();
        cli.ensure(Track::Hvac).await.unwrap();

        assert_eq!(service.add(Track::Hvac, "one", Metadata::new()).await.unwrap(), "hvac_1");
        assert_eq!(cli.add(Track::Hvac, "two", Metadata::new()).await.unwrap(), "hvac_2");
        assert_eq!(service.add(Track::Hvac, "three", Metadata::new()).await.unwrap(), "hvac_3");

        assert_eq!(cli.count(Track::Hvac).await.unwrap(), 3);
        assert_eq!(service.count(Track::Hvac).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_adds_from_two_stores_keep_every_document() {
        let temp = TempDir::new().unwrap();
        let stores = [Arc::new(store(&temp)), Arc::new(store(&temp))];

        let mut handles = Vec::new();
        for i in 0..12 {
            let store = Arc::clone(&stores[i % 2]);
            handles.push(tokio::spawn(async move {
                store.add(Track::Nursing, &format!("note {}", i), Metadata::new()).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 12);
        assert_eq!(stores[0].count(Track::Nursing).await.unwrap(), 12);
        assert_eq!(store(&temp).count(Track::Nursing).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_clear_by_one_store_is_seen_by_another() {
        let temp = TempDir::new().unwrap();
        let cli = store(&temp);
        let service = store(&temp);
        service.add(Track::Spiritual, "Psalm 23", Metadata::new()).await.unwrap();
        assert_eq!(cli.count(Track::Spiritual).await.unwrap(), 1);

        cli.clear(Track::Spiritual).await.unwrap();

        assert_eq!(service.count(Track::Spiritual).await.unwrap(), 0);
        let id = service.add(Track::Spiritual, "Psalm 46", Metadata::new()).await.unwrap();
        assert_eq!(id, "spiritual_1");
    }

    #[tokio::test]
    async fn test_add_times_out_waiting_for_busy_track() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp).with_timeout(Duration::from_millis(50));
        let busy = store.slots[Track::Hvac.index()].write().await;

        let result = store.add(Track::Hvac, "blocked", Metadata::new()).await;
        match result {
            Err(RagError::StoreUnavailable(message)) => assert!(message.contains("timed out")),
            other => panic!("expected a timeout, got {:?}", other),
        }

        drop(busy);
        assert_eq!(store.count(Track::Hvac).await.unwrap(), 0);
    }

    /// Local collection whose writes take longer than the store timeout
    struct SlowIndex {
        inner: LocalIndex,
        delay: Duration,
    }

    struct SlowCollection {
        inner: Box<dyn Collection>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl VectorIndex for SlowIndex {
        fn backend(&self) -> &'static str {
            "slow"
        }

        fn location(&self) -> String {
            self.inner.location()
        }

        async fn open(&self, spec: &CollectionSpec) -> Result<Box<dyn Collection>> {
            Ok(Box::new(SlowCollection {
                inner: self.inner.open(spec).await?,
                delay: self.delay,
            }))
        }
    }

    #[async_trait::async_trait]
    impl Collection for SlowCollection {
        fn info(&self) -> &CollectionInfo {
            self.inner.info()
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn append(&mut self, document: NewDocument) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.inner.append(document).await
        }

        async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
            self.inner.search(vector, limit).await
        }

        async fn reset(&mut self) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.reset().await
        }
    }

    #[tokio::test]
    async fn test_slow_write_is_not_cut_off_by_timeout() {
        let temp = TempDir::new().unwrap();
        let index = Arc::new(SlowIndex {
            inner: LocalIndex::new(temp.path()).unwrap(),
            delay: Duration::from_millis(150),
        });
        let store = KnowledgeStore::new(index, Arc::new(HashingEmbedder::new(128)))
            .with_timeout(Duration::from_millis(30));

        let id = store.add(Track::Hvac, "slow but stored", Metadata::new()).await.unwrap();
        assert_eq!(id, "hvac_1");
        store.clear(Track::Hvac).await.unwrap();

        let reopened = KnowledgeStore::new(
            Arc::new(LocalIndex::new(temp.path()).unwrap()),
            Arc::new(HashingEmbedder::new(128)),
        );
        assert_eq!(reopened.count(Track::Hvac).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        store(&temp).add(Track::Nursing, "Wound care", Metadata::new()).await.unwrap();
        assert_eq!(store(&temp).count(Track::Nursing).await.unwrap(), 1);
    }
}
