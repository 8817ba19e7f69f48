//! Qdrant-backed vector index
//!
//! Each track is an alias (`hvac`) pointing at a physical collection
//! (`hvac_v<millis>`). Reads and writes go through the alias. A reset builds an
//! empty physical collection and repoints the alias in one `update_aliases`
//! call, so readers see either the old documents or none, never a missing
//! collection.
#![allow(deprecated)]

use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        alias_operations::Action, vectors_config::Config, with_payload_selector::SelectorOptions,
        AliasOperations, ChangeAliases, CreateAlias, CreateCollection, DeleteAlias, Distance,
        PointStruct, SearchPoints, Value as QdrantValue, VectorParams, VectorsConfig,
        WithPayloadSelector,
    },
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{RagError, Result};
use crate::knowledge::index::{
    sort_by_relevance, Collection, CollectionInfo, CollectionSpec, NewDocument, ScoredRecord,
    VectorIndex,
};
use crate::types::Metadata;

const DOCUMENT_KEY: &str = "document";
const DOC_ID_KEY: &str = "doc_id";
const SEQ_KEY: &str = "seq";

/// Collections on a Qdrant server
pub struct QdrantIndex {
    client: Arc<QdrantClient>,
    url: String,
}

impl QdrantIndex {
    pub fn new(url: &str) -> Result<Self> {
        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| {
                RagError::StoreUnavailable(format!("Failed to create Qdrant client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            url: url.to_string(),
        })
    }
}

fn unavailable(what: &str) -> impl Fn(anyhow::Error) -> RagError + '_ {
    move |e| RagError::StoreUnavailable(format!("{}: {}", what, e))
}

/// Fresh physical collection name for `alias`
fn physical_name(alias: &str) -> String {
    format!("{}_v{}", alias, Utc::now().timestamp_millis())
}

/// Point `alias` at `target`, dropping its current binding in the same call
fn alias_swap(alias: &str, rebind: bool, target: &str) -> ChangeAliases {
    let mut actions = Vec::with_capacity(2);
    if rebind {
        actions.push(AliasOperations {
            action: Some(Action::DeleteAlias(DeleteAlias {
                alias_name: alias.to_string(),
            })),
        });
    }
    actions.push(AliasOperations {
        action: Some(Action::CreateAlias(CreateAlias {
            collection_name: target.to_string(),
            alias_name: alias.to_string(),
        })),
    });
    ChangeAliases {
        actions,
        timeout: None,
    }
}

/// Physical collection currently behind `alias`
async fn resolve_alias(client: &QdrantClient, alias: &str) -> Result<Option<String>> {
    let aliases = client
        .list_aliases()
        .await
        .map_err(unavailable("Failed to list aliases"))?;
    Ok(aliases
        .aliases
        .into_iter()
        .find(|a| a.alias_name == alias)
        .map(|a| a.collection_name))
}

async fn create_collection(client: &QdrantClient, name: &str, spec: &CollectionSpec) -> Result<()> {
    client
        .create_collection(&CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(VectorsConfig {
                config: Some(Config::Params(VectorParams {
                    size: spec.dimension as u64,
                    distance: Distance::Cosine.into(),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        })
        .await
        .map_err(unavailable("Failed to create collection"))?;
    Ok(())
}

async fn check_dimension(client: &QdrantClient, name: &str, spec: &CollectionSpec) -> Result<()> {
    let info = client
        .collection_info(name)
        .await
        .map_err(unavailable("Failed to get collection info"))?;
    let size = info
        .result
        .and_then(|r| r.config)
        .and_then(|c| c.params)
        .and_then(|p| p.vectors_config)
        .and_then(|v| v.config)
        .and_then(|c| match c {
            Config::Params(params) => Some(params.size),
            _ => None,
        });

    match size {
        Some(size) if size as usize != spec.dimension => Err(RagError::StoreUnavailable(format!(
            "Collection '{}' has {} dims, configured embedder produces {}",
            spec.name, size, spec.dimension
        ))),
        _ => Ok(()),
    }
}

/// Create an empty physical collection and bind `spec.name` to it
async fn create_bound(
    client: &QdrantClient,
    spec: &CollectionSpec,
    rebind: bool,
) -> Result<String> {
    let physical = physical_name(&spec.name);
    create_collection(client, &physical, spec).await?;

    if let Err(e) = client.update_aliases(alias_swap(&spec.name, rebind, &physical)).await {
        if let Err(cleanup) = client.delete_collection(&physical).await {
            warn!(collection = %physical, error = %cleanup, "Failed to drop unbound collection");
        }
        return Err(unavailable("Failed to update alias")(e));
    }
    Ok(physical)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    fn location(&self) -> String {
        self.url.clone()
    }

    async fn open(&self, spec: &CollectionSpec) -> Result<Box<dyn Collection>> {
        if let Some(physical) = resolve_alias(&self.client, &spec.name).await? {
            check_dimension(&self.client, &physical, spec).await?;
            info!(
                collection = %spec.name,
                physical = %physical,
                "Connected to existing Qdrant collection"
            );
        } else if self
            .client
            .collection_exists(&spec.name)
            .await
            .map_err(unavailable("Failed to check collection"))?
        {
            // Unaliased collection; moved behind an alias on its first reset
            check_dimension(&self.client, &spec.name, spec).await?;
            info!(collection = %spec.name, "Connected to existing Qdrant collection");
        } else {
            let physical = create_bound(&self.client, spec, false).await?;
            info!(
                collection = %spec.name,
                physical = %physical,
                "Created new Qdrant collection"
            );
        }

        Ok(Box::new(QdrantCollection {
            client: Arc::clone(&self.client),
            spec: spec.clone(),
            info: CollectionInfo::from_spec(spec),
        }))
    }
}

struct QdrantCollection {
    client: Arc<QdrantClient>,
    spec: CollectionSpec,
    info: CollectionInfo,
}

#[async_trait]
impl Collection for QdrantCollection {
    fn info(&self) -> &CollectionInfo {
        &self.info
    }

    async fn count(&self) -> Result<usize> {
        let target = resolve_alias(&self.client, &self.spec.name)
            .await?
            .unwrap_or_else(|| self.spec.name.clone());
        let info = self
            .client
            .collection_info(&target)
            .await
            .map_err(unavailable("Failed to get collection info"))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0) as usize)
    }

    async fn append(&mut self, document: NewDocument) -> Result<String> {
        let seq = self.count().await? as u64 + 1;
        let record = document.into_record(&self.spec.name, seq);
        let id = record.id.clone();

        let mut payload_map = HashMap::new();
        for (key, value) in record.metadata {
            payload_map.insert(key, json_to_qdrant_value(value));
        }
        payload_map.insert(DOCUMENT_KEY.to_string(), QdrantValue::from(record.content));
        payload_map.insert(DOC_ID_KEY.to_string(), QdrantValue::from(record.id));
        payload_map.insert(SEQ_KEY.to_string(), QdrantValue::from(record.seq as i64));

        let point = PointStruct::new(record.seq, record.embedding, payload_map);

        self.client
            .upsert_points_blocking(&self.spec.name, None, vec![point], None)
            .await
            .map_err(unavailable("Failed to upsert point"))?;

        Ok(id)
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.spec.name.clone(),
                vector: vector.to_vec(),
                limit: limit as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(unavailable("Failed to search points"))?;

        let mut hits: Vec<ScoredRecord> = search_result
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                let content = payload
                    .get(DOCUMENT_KEY)
                    .and_then(qdrant_value_to_string)
                    .unwrap_or_default();
                let id = payload
                    .get(DOC_ID_KEY)
                    .and_then(qdrant_value_to_string)
                    .unwrap_or_default();
                let seq = payload
                    .get(SEQ_KEY)
                    .and_then(qdrant_to_json_value)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(u64::MAX);

                let mut metadata = Metadata::new();
                for (key, value) in payload {
                    if key == DOCUMENT_KEY || key == DOC_ID_KEY || key == SEQ_KEY {
                        continue;
                    }
                    if let Some(json_val) = qdrant_to_json_value(&value) {
                        metadata.insert(key, json_val);
                    }
                }

                ScoredRecord {
                    id,
                    seq,
                    content,
                    metadata,
                    score: point.score,
                }
            })
            .collect();

        sort_by_relevance(&mut hits);
        Ok(hits)
    }

    async fn reset(&mut self) -> Result<()> {
        let name = &self.spec.name;
        let previous = resolve_alias(&self.client, name).await?;

        if previous.is_none()
            && self
                .client
                .collection_exists(name)
                .await
                .map_err(unavailable("Failed to check collection"))?
        {
            // An alias cannot share a name with a collection, so the
            // unaliased one has to go before the alias can exist
            self.client
                .delete_collection(name)
                .await
                .map_err(unavailable("Failed to delete collection"))?;
        }

        let physical = create_bound(&self.client, &self.spec, previous.is_some()).await?;
        info!(collection = %name, physical = %physical, "Collection swapped for an empty one");

        if let Some(old) = previous {
            if let Err(e) = self.client.delete_collection(&old).await {
                warn!(collection = %old, error = %e, "Failed to drop replaced collection");
            }
        }

        self.info = CollectionInfo::from_spec(&self.spec);
        Ok(())
    }
}

// Helper functions for type conversions
fn json_to_qdrant_value(json: JsonValue) -> QdrantValue {
    match json {
        JsonValue::String(s) => QdrantValue::from(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                QdrantValue::from(i)
            } else if let Some(f) = n.as_f64() {
                QdrantValue::from(f)
            } else {
                QdrantValue::from(0i64)
            }
        }
        JsonValue::Bool(b) => QdrantValue::from(b),
        // Nested values are kept as their JSON text
        other => QdrantValue::from(other.to_string()),
    }
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
            Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
            Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
            Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
            _ => None,
        }
    })
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_scalars() {
        for value in [
            JsonValue::String("Chapter 3".into()),
            JsonValue::Number(42.into()),
            JsonValue::Bool(true),
        ] {
            let converted = json_to_qdrant_value(value.clone());
            assert_eq!(qdrant_to_json_value(&converted), Some(value));
        }
    }

    #[test]
    fn test_nested_json_kept_as_text() {
        let converted = json_to_qdrant_value(serde_json::json!({"page": 4}));
        assert_eq!(qdrant_value_to_string(&converted).as_deref(), Some(r#"{"page":4}"#));
    }

    #[test]
    fn test_physical_name_extends_alias() {
        let name = physical_name("hvac");
        assert!(name.starts_with("hvac_v"));
        assert!(name["hvac_v".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_alias_swap_unbinds_then_binds_in_one_request() {
        let change = alias_swap("nursing", true, "nursing_v2");
        assert_eq!(change.actions.len(), 2);
        assert_eq!(
            change.actions[0].action,
            Some(Action::DeleteAlias(DeleteAlias {
                alias_name: "nursing".into()
            }))
        );
        assert_eq!(
            change.actions[1].action,
            Some(Action::CreateAlias(CreateAlias {
                collection_name: "nursing_v2".into(),
                alias_name: "nursing".into()
            }))
        );
    }

    #[test]
    fn test_first_binding_only_creates() {
        let change = alias_swap("hvac", false, "hvac_v1");
        assert_eq!(change.actions.len(), 1);
        assert!(matches!(change.actions[0].action, Some(Action::CreateAlias(_))));
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant
    async fn test_open_append_and_reset() {
        let index = QdrantIndex::new("http://localhost:6334").unwrap();
        let spec = CollectionSpec {
            name: "trackrag_test".into(),
            embedding_function: "test".into(),
            dimension: 2,
        };
        let mut collection = index.open(&spec).await.unwrap();
        collection.reset().await.unwrap();
        let before = resolve_alias(&index.client, "trackrag_test").await.unwrap();

        let id = collection
            .append(NewDocument {
                content: "doc".into(),
                metadata: Metadata::new(),
                embedding: vec![1.0, 0.0],
            })
            .await
            .unwrap();
        assert_eq!(id, "trackrag_test_1");
        let hits = collection.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, "trackrag_test_1");

        collection.reset().await.unwrap();
        assert_eq!(collection.count().await.unwrap(), 0);
        let after = resolve_alias(&index.client, "trackrag_test").await.unwrap();
        assert_ne!(before, after);
        assert!(!index.client.collection_exists(before.unwrap()).await.unwrap());
    }
}
