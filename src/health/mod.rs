//! Health and statistics reports
//!
//! Both reports are read-only and bounded: every backend probe and every
//! per-track count runs under a short timeout, and a track whose count cannot
//! be read is reported with a sentinel instead of failing the report.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::HealthProbe;
use crate::errors::{RagError, Result};
use crate::knowledge::KnowledgeStore;
use crate::types::Track;

/// Count reported for a track whose collection cannot be read
pub const COUNT_UNAVAILABLE: i64 = -1;

pub const STATUS_HEALTHY: &str = "healthy";
pub const STATUS_DEGRADED: &str = "degraded";

/// Default bound on each probe and count
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// Track name to document count, or `COUNT_UNAVAILABLE`
    pub collections: BTreeMap<String, i64>,
    /// Backend name to reachability
    #[serde(default)]
    pub backends: BTreeMap<String, bool>,
    #[serde(default)]
    pub embedding_function: String,
    #[serde(default)]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub database_path: String,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_HEALTHY
    }

    /// Service answered and can serve at least some tracks.
    ///
    /// A degraded report still counts: one unreadable collection must not
    /// close augmentation for the others.
    pub fn is_reachable(&self) -> bool {
        self.status == STATUS_HEALTHY || self.status == STATUS_DEGRADED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
    pub document_count: usize,
    /// "active" or "error"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub tracks: BTreeMap<String, TrackStats>,
    pub total_documents: usize,
    #[serde(default)]
    pub embedding_function: String,
    #[serde(default)]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub database_path: String,
}

/// Builds health and stats reports for one knowledge store
pub struct HealthAggregator {
    store: Arc<KnowledgeStore>,
    probes: Vec<(String, Arc<dyn HealthProbe>)>,
    timeout: Duration,
}

impl HealthAggregator {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            probes: Vec::new(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Report reachability of `probe` under `name`
    pub fn with_probe(mut self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push((name.into(), probe));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn health(&self) -> HealthReport {
        let (backends, counts) = tokio::join!(self.probe_backends(), self.counts());

        let collections: BTreeMap<String, i64> = counts
            .into_iter()
            .map(|(track, count)| {
                let count = count.map_or(COUNT_UNAVAILABLE, |n| n as i64);
                (track.to_string(), count)
            })
            .collect();

        let status = if collections.values().any(|&c| c == COUNT_UNAVAILABLE) {
            STATUS_DEGRADED
        } else {
            STATUS_HEALTHY
        };

        HealthReport {
            status: status.to_string(),
            collections,
            backends,
            embedding_function: self.store.embedding_function().to_string(),
            embedding_dimension: self.store.embedding_dimension(),
            database_path: self.store.location(),
        }
    }

    pub async fn stats(&self) -> StatsReport {
        let mut tracks = BTreeMap::new();
        let mut total_documents = 0;

        for (track, count) in self.counts().await {
            let stats = match count {
                Ok(n) => {
                    total_documents += n;
                    TrackStats {
                        document_count: n,
                        status: "active".to_string(),
                        error: None,
                    }
                }
                Err(e) => TrackStats {
                    document_count: 0,
                    status: "error".to_string(),
                    error: Some(e.to_string()),
                },
            };
            tracks.insert(track.to_string(), stats);
        }

        StatsReport {
            tracks,
            total_documents,
            embedding_function: self.store.embedding_function().to_string(),
            embedding_dimension: self.store.embedding_dimension(),
            database_path: self.store.location(),
        }
    }

    async fn probe_backends(&self) -> BTreeMap<String, bool> {
        let checks = self.probes.iter().map(|(name, probe)| async move {
            let healthy = tokio::time::timeout(self.timeout, probe.is_healthy())
                .await
                .unwrap_or(false);
            debug!(backend = %name, healthy, "Backend probed");
            (name.clone(), healthy)
        });
        join_all(checks).await.into_iter().collect()
    }

    async fn counts(&self) -> Vec<(Track, Result<usize>)> {
        let counts = Track::ALL.into_iter().map(|track| async move {
            let count = tokio::time::timeout(self.timeout, self.store.count(track))
                .await
                .unwrap_or_else(|_| {
                    Err(RagError::StoreUnavailable(format!(
                        "Count timed out after {}ms",
                        self.timeout.as_millis()
                    )))
                });
            (track, count)
        });
        join_all(counts).await
    }
}
