use anyhow::Result;
use contentdesk::llm::{LlmProvider, LlmRequest, LlmResponse, Summary};
use contentdesk::vector_store::{
    Metadata, MetadataValue, SimilaritySearch, SqliteVectorIndex,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Bag-of-letters embedding: texts sharing letters end up close together.
struct LetterEmbedder;

#[async_trait::async_trait]
impl LlmProvider for LetterEmbedder {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
        anyhow::bail!("not used")
    }
    async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<Summary> {
        anyhow::bail!("not used")
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

async fn memory_pool() -> SqlitePool {
    // A single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    common::ensure_schema(&pool).await.unwrap();
    pool
}

fn store(pool: SqlitePool, collection: &str) -> SimilaritySearch {
    SimilaritySearch::new(Arc::new(SqliteVectorIndex::new(
        pool,
        collection,
        Arc::new(LetterEmbedder),
    )))
}

#[tokio::test]
async fn add_then_search_ranks_nearest_first() {
    let store = store(memory_pool().await, "docs");

    store
        .add(
            vec!["aaaa".to_string(), "zzzz".to_string(), "aazz".to_string()],
            None,
            None,
        )
        .await
        .unwrap();

    let hits = store.search("aaa", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "doc_0");
    assert!(hits[0].distance.abs() < 1e-6);
    assert_eq!(hits[1].id, "doc_2");
    assert_eq!(
        hits[0].metadata.get("source"),
        Some(&MetadataValue::Str("document_0".to_string()))
    );

    assert!(store.search("aaa", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_ids_are_skipped() {
    let store = store(memory_pool().await, "docs");

    store.add(vec!["first".to_string()], None, None).await.unwrap();
    store.add(vec!["second".to_string()], None, None).await.unwrap();

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].document, "first");
}

#[tokio::test]
async fn get_update_delete() {
    let store = store(memory_pool().await, "docs");

    let mut meta = Metadata::new();
    meta.insert("type".to_string(), "content".into());
    store
        .add(vec!["hello".to_string()], Some(vec![meta.clone()]), Some(vec!["h1".to_string()]))
        .await
        .unwrap();

    let got = store.get("h1").await.unwrap().unwrap();
    assert_eq!(got.document, "hello");
    assert_eq!(got.metadata, meta);

    store.update("h1", "goodbye", None).await.unwrap();
    let got = store.get("h1").await.unwrap().unwrap();
    assert_eq!(got.document, "goodbye");
    assert_eq!(
        got.metadata.get("source"),
        Some(&MetadataValue::Str("document_h1".to_string()))
    );

    // Updated embedding is used for ranking
    let hits = store.search("goodbye", 1).await.unwrap();
    assert!(hits[0].distance.abs() < 1e-6);

    store.delete("h1").await.unwrap();
    assert!(store.get("h1").await.unwrap().is_none());
    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn collections_are_isolated() {
    let pool = memory_pool().await;
    let a = store(pool.clone(), "a");
    let b = store(pool, "b");

    a.add(vec!["only in a".to_string()], None, None).await.unwrap();

    assert_eq!(a.all().await.unwrap().len(), 1);
    assert!(b.all().await.unwrap().is_empty());
    assert!(b.search("only", 5).await.unwrap().is_empty());
}

/// Fails to embed any text containing "bad".
struct PickyEmbedder;

#[async_trait::async_trait]
impl LlmProvider for PickyEmbedder {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
        anyhow::bail!("not used")
    }
    async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<Summary> {
        anyhow::bail!("not used")
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        anyhow::ensure!(!text.contains("bad"), "embedding service rejected input");
        LetterEmbedder.embed(text).await
    }
}

#[tokio::test]
async fn failed_embedding_leaves_store_untouched() {
    let store = SimilaritySearch::new(Arc::new(SqliteVectorIndex::new(
        memory_pool().await,
        "docs",
        Arc::new(PickyEmbedder),
    )));

    let result = store
        .add(vec!["good".to_string(), "bad".to_string()], None, None)
        .await;
    assert!(result.is_err());
    assert!(store.all().await.unwrap().is_empty());

    // The same batch goes through once every document embeds
    store
        .add(vec!["good".to_string(), "fine".to_string()], None, None)
        .await
        .unwrap();
    assert_eq!(store.all().await.unwrap().len(), 2);
}
