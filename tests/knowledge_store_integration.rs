//! Knowledge store and retrieval over real on-disk collections

use std::sync::Arc;

use quickcheck_macros::quickcheck;
use serde_json::json;
use tempfile::TempDir;
use trackrag::embedding::HashingEmbedder;
use trackrag::knowledge::{KnowledgeStore, LocalIndex};
use trackrag::rag::{augment_prompt, RetrievalPipeline};
use trackrag::types::Metadata;
use trackrag::{RagError, Track};

fn store_in(dir: &TempDir) -> Arc<KnowledgeStore> {
    let index = Arc::new(LocalIndex::new(dir.path()).unwrap());
    Arc::new(KnowledgeStore::new(index, Arc::new(HashingEmbedder::new(128))))
}

async fn seed(store: &KnowledgeStore, track: Track, docs: &[&str]) {
    for (i, doc) in docs.iter().enumerate() {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), json!(format!("doc {}", i + 1)));
        store.add(track, doc, metadata).await.unwrap();
    }
}

#[quickcheck]
fn prop_query_returns_at_most_min_of_top_k_and_count(docs: u8, top_k: u8) -> bool {
    let docs = (docs % 8) as usize;
    let top_k = (top_k % 10) as usize;

    tokio_test::block_on(async {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for i in 0..docs {
            store
                .add(Track::Hvac, &format!("furnace note {}", i), Metadata::new())
                .await
                .unwrap();
        }

        let matches = store.query(Track::Hvac, "furnace", top_k).await.unwrap();
        matches.len() == top_k.min(docs)
            && matches.iter().enumerate().all(|(i, m)| m.rank == i + 1)
    })
}

#[tokio::test]
async fn test_nursing_top_k_exceeds_count() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    seed(
        &store,
        Track::Nursing,
        &[
            "Normal adult resting heart rate is 60 to 100 beats per minute.",
            "Blood pressure is recorded as systolic over diastolic.",
        ],
    )
    .await;

    let pipeline = RetrievalPipeline::new(Arc::clone(&store));
    let retrieval = pipeline
        .retrieve(Some(Track::Nursing), "What is a normal heart rate?", 5)
        .await
        .unwrap();

    assert_eq!(retrieval.len(), 2);
    assert_eq!(retrieval.sources.len(), 2);
    assert!(retrieval.documents[0].content.contains("heart rate"));
    assert!(retrieval.documents[0].score >= retrieval.documents[1].score);

    let prompt = augment_prompt("What is a normal heart rate?", &retrieval.contents());
    assert!(prompt.contains("Reference 1: "));
    assert!(prompt.contains("Reference 2: "));
    assert!(!prompt.contains("Reference 3: "));
}

#[tokio::test]
async fn test_repeated_query_is_stable() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    seed(
        &store,
        Track::MentalHealth,
        &[
            "Box breathing: inhale four, hold four, exhale four, hold four.",
            "Body scan meditation moves attention from feet to head.",
            "Breathing exercises calm the nervous system.",
        ],
    )
    .await;

    let first = store.query(Track::MentalHealth, "breathing exercise", 3).await.unwrap();
    for _ in 0..5 {
        let again = store.query(Track::MentalHealth, "breathing exercise", 3).await.unwrap();
        let ids: Vec<_> = again.iter().map(|m| &m.id).collect();
        assert_eq!(ids, first.iter().map(|m| &m.id).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_collections_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = store_in(&dir);
        seed(&store, Track::Spiritual, &["Psalm 46:10", "Matthew 6:34"]).await;
    }

    let reopened = store_in(&dir);
    assert_eq!(reopened.count(Track::Spiritual).await.unwrap(), 2);
    assert_eq!(reopened.count(Track::Hvac).await.unwrap(), 0);

    let id = reopened
        .add(Track::Spiritual, "Philippians 4:6", Metadata::new())
        .await
        .unwrap();
    assert_eq!(id, "spiritual_3");
}

#[tokio::test]
async fn test_tracks_are_isolated() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    seed(&store, Track::Hvac, &["Replace the air filter every 90 days."]).await;

    let pipeline = RetrievalPipeline::new(Arc::clone(&store));
    let retrieval = pipeline
        .retrieve(Some(Track::Nursing), "air filter", 3)
        .await
        .unwrap();
    assert!(retrieval.is_empty());
    assert!(retrieval.into_sources().is_none());

    store.clear(Track::Nursing).await.unwrap();
    assert_eq!(store.count(Track::Hvac).await.unwrap(), 1);
}

#[tokio::test]
async fn test_no_track_retrieves_nothing() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    seed(&store, Track::Hvac, &["Compressor short cycling"]).await;

    let retrieval = RetrievalPipeline::new(store)
        .retrieve(None, "compressor", 3)
        .await
        .unwrap();
    assert!(retrieval.is_empty());
}

#[test]
fn test_unknown_track_never_reaches_the_store() {
    let dir = TempDir::new().unwrap();
    let _store = store_in(&dir);

    match Track::parse("plumbing") {
        Err(RagError::UnknownTrack { name, valid }) => {
            assert_eq!(name, "plumbing");
            assert_eq!(valid, "hvac, nursing, spiritual, mental_health");
        }
        other => panic!("expected UnknownTrack, got {:?}", other),
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
