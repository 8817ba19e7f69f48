//! File-backed vector index
//!
//! One JSON file per collection under the data directory. Every mutation
//! writes a complete new file next to the old one and renames it over, so a
//! collection on disk is always either the old or the new version.
//!
//! Several processes may share a directory. Nothing is cached between calls:
//! reads load the current file, and mutations hold an exclusive lock on
//! `<name>.lock` while they re-read, modify and replace it. The lock lives in
//! a sidecar file because the rename swaps out the collection file's inode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::embedding::cosine_similarity;
use crate::errors::{RagError, Result};
use crate::knowledge::index::{
    sort_by_relevance, Collection, CollectionInfo, CollectionSpec, IndexRecord, NewDocument,
    ScoredRecord, VectorIndex,
};

/// Directory of per-collection JSON files
#[derive(Debug, Clone)]
pub struct LocalIndex {
    dir: PathBuf,
}

impl LocalIndex {
    /// Create the index, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            RagError::StoreUnavailable(format!(
                "Failed to create knowledge directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    async fn open(&self, spec: &CollectionSpec) -> Result<Box<dyn Collection>> {
        let files = CollectionFiles {
            path: self.collection_path(&spec.name),
            lock_path: self.lock_path(&spec.name),
        };

        let info = {
            let files = files.clone();
            let spec = spec.clone();
            blocking(move || files.open_or_create(&spec)).await?
        };

        Ok(Box::new(LocalCollection { files, info }))
    }
}

/// On-disk layout of one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionFile {
    info: CollectionInfo,
    records: Vec<IndexRecord>,
}

impl CollectionFile {
    fn empty(spec: &CollectionSpec) -> Self {
        Self {
            info: CollectionInfo::from_spec(spec),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CollectionFiles {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CollectionFiles {
    /// Current contents, or `None` when the file does not exist
    fn load(&self) -> Result<Option<CollectionFile>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RagError::StoreUnavailable(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            RagError::StoreUnavailable(format!(
                "Corrupt collection file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Contents checked against the identity the collection was opened with
    fn load_matching(&self, spec: &CollectionSpec) -> Result<CollectionFile> {
        match self.load()? {
            Some(file) => {
                check_compatible(&file.info, spec)?;
                Ok(file)
            }
            None => Ok(CollectionFile::empty(spec)),
        }
    }

    fn open_or_create(&self, spec: &CollectionSpec) -> Result<CollectionInfo> {
        if let Some(file) = self.load()? {
            check_compatible(&file.info, spec)?;
            info!(
                collection = %spec.name,
                documents = file.records.len(),
                "Connected to existing collection"
            );
            return Ok(file.info);
        }

        let _lock = self.lock()?;
        // Another process may have created it while we waited
        if let Some(file) = self.load()? {
            check_compatible(&file.info, spec)?;
            return Ok(file.info);
        }
        let file = CollectionFile::empty(spec);
        self.store(&file)?;
        info!(collection = %spec.name, "Created new collection");
        Ok(file.info)
    }

    fn append(
        &self,
        spec: &CollectionSpec,
        document: NewDocument,
    ) -> Result<(String, CollectionInfo)> {
        let _lock = self.lock()?;
        let mut file = self.load_matching(spec)?;

        let seq = file.records.len() as u64 + 1;
        let record = document.into_record(&spec.name, seq);
        let id = record.id.clone();
        file.records.push(record);

        self.store(&file)?;
        Ok((id, file.info))
    }

    fn reset(&self, spec: &CollectionSpec) -> Result<CollectionInfo> {
        let _lock = self.lock()?;
        let file = CollectionFile::empty(spec);
        self.store(&file)?;
        Ok(file.info)
    }

    fn lock(&self) -> Result<LockGuard> {
        LockGuard::exclusive(&self.lock_path)
    }

    fn store(&self, file: &CollectionFile) -> Result<()> {
        let bytes = serde_json::to_vec(file).map_err(|e| {
            RagError::StoreUnavailable(format!("Failed to serialize collection: {}", e))
        })?;
        write_atomic(&self.path, &bytes)
    }
}

/// Exclusive advisory lock, released on drop
struct LockGuard {
    file: File,
}

impl LockGuard {
    fn exclusive(path: &Path) -> Result<Self> {
        let unavailable = |e: std::io::Error| {
            RagError::StoreUnavailable(format!("Failed to lock {}: {}", path.display(), e))
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(unavailable)?;
        file.lock().map_err(unavailable)?;
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

struct LocalCollection {
    files: CollectionFiles,
    info: CollectionInfo,
}

impl LocalCollection {
    fn spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.info.name.clone(),
            embedding_function: self.info.embedding_function.clone(),
            dimension: self.info.dimension,
        }
    }

    async fn records(&self) -> Result<Vec<IndexRecord>> {
        let files = self.files.clone();
        let spec = self.spec();
        blocking(move || files.load_matching(&spec).map(|file| file.records)).await
    }
}

#[async_trait]
impl Collection for LocalCollection {
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records().await?.len())
    }

    async fn append(&mut self, document: NewDocument) -> Result<String> {
        if document.embedding.len() != self.info.dimension {
            return Err(RagError::StoreUnavailable(format!(
                "Embedding has {} dims, collection '{}' expects {}",
                document.embedding.len(),
                self.info.name,
                self.info.dimension
            )));
        }

        let files = self.files.clone();
        let spec = self.spec();
        let (id, info) = blocking(move || files.append(&spec, document)).await?;
        self.info = info;
        Ok(id)
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let mut hits: Vec<ScoredRecord> = self
            .records()
            .await?
            .into_iter()
            .map(|r| ScoredRecord {
                score: cosine_similarity(vector, &r.embedding),
                id: r.id,
                seq: r.seq,
                content: r.content,
                metadata: r.metadata,
            })
            .collect();

        sort_by_relevance(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn reset(&mut self) -> Result<()> {
        let files = self.files.clone();
        let spec = self.spec();
        self.info = blocking(move || files.reset(&spec)).await?;
        debug!(collection = %self.info.name, "Collection reset");
        Ok(())
    }
}

fn check_compatible(info: &CollectionInfo, spec: &CollectionSpec) -> Result<()> {
    if info.is_compatible(spec) {
        return Ok(());
    }
    Err(RagError::StoreUnavailable(format!(
        "Collection '{}' was created with {} ({} dims), configured embedder is {} ({} dims)",
        spec.name, info.embedding_function, info.dimension, spec.embedding_function, spec.dimension
    )))
}

/// Run file work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::StoreUnavailable(format!("Store task failed: {}", e)))?
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let unavailable = |e: std::io::Error| {
        RagError::StoreUnavailable(format!("Failed to write {}: {}", path.display(), e))
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(unavailable)?;
    tmp.write_all(bytes).map_err(unavailable)?;
    tmp.as_file().sync_all().map_err(unavailable)?;
    tmp.persist(path).map_err(|e| unavailable(e.error))?;
    Ok(())
}
