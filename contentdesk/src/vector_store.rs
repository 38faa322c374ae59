//! Similarity search over previously seen content.
//!
//! [`SimilaritySearch`] is the narrow surface the rest of the crate uses: it
//! fills in default ids and metadata, then forwards to a [`VectorIndex`].
//! [`SqliteVectorIndex`] is the bundled index: embeddings come from the
//! configured LLM endpoint and live as little-endian f32 BLOBs in SQLite;
//! queries rank every row of the collection by cosine distance.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::LlmProvider;

/// Scalar metadata value attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<usize> for MetadataValue {
    /// Saturates at `i64::MAX`.
    fn from(v: usize) -> Self {
        MetadataValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A document as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// One query match; smaller `distance` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Contract of the embedding + nearest-neighbour engine.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records. Ids that already exist are left untouched.
    async fn add(&self, records: Vec<SimilarityRecord>) -> Result<()>;

    /// Up to `k` records closest to `text`, nearest first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>>;

    async fn get(&self, id: &str) -> Result<Option<SimilarityRecord>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Replace document and metadata of an existing record.
    async fn update(&self, record: SimilarityRecord) -> Result<()>;

    async fn all(&self) -> Result<Vec<SimilarityRecord>>;
}

/// `{"source": "document_{i}"}` for each position.
pub fn default_metadatas(count: usize) -> Vec<Metadata> {
    (0..count)
        .map(|i| source_metadata(format!("document_{}", i)))
        .collect()
}

/// `doc_{i}` for each position.
pub fn default_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("doc_{}", i)).collect()
}

fn source_metadata(source: String) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), MetadataValue::Str(source));
    metadata
}

/// Pass-through adapter in front of a [`VectorIndex`].
#[derive(Clone)]
pub struct SimilaritySearch {
    index: Arc<dyn VectorIndex>,
}

impl SimilaritySearch {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Add documents. Missing metadatas and ids are synthesized from each
    /// document's position in `documents`.
    pub async fn add(
        &self,
        documents: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
        ids: Option<Vec<String>>,
    ) -> Result<()> {
        let count = documents.len();
        let metadatas = metadatas.unwrap_or_else(|| default_metadatas(count));
        let ids = ids.unwrap_or_else(|| default_ids(count));

        anyhow::ensure!(
            metadatas.len() == count,
            "got {} metadatas for {} documents",
            metadatas.len(),
            count
        );
        anyhow::ensure!(ids.len() == count, "got {} ids for {} documents", ids.len(), count);

        let records = documents
            .into_iter()
            .zip(metadatas)
            .zip(ids)
            .map(|((document, metadata), id)| SimilarityRecord {
                id,
                document,
                metadata,
            })
            .collect();

        self.index.add(records).await
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.index.query(query, k).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<SimilarityRecord>> {
        self.index.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.index.delete(id).await
    }

    /// Replace a document; without metadata it gets `{"source": "document_{id}"}`.
    pub async fn update(&self, id: &str, document: &str, metadata: Option<Metadata>) -> Result<()> {
        let metadata = metadata.unwrap_or_else(|| source_metadata(format!("document_{}", id)));
        self.index
            .update(SimilarityRecord {
                id: id.to_string(),
                document: document.to_string(),
                metadata,
            })
            .await
    }

    pub async fn all(&self) -> Result<Vec<SimilarityRecord>> {
        self.index.all().await
    }
}

/// SQLite-backed [`VectorIndex`] with brute-force cosine ranking.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn LlmProvider>,
}

impl SqliteVectorIndex {
    /// The pool must already carry the `documents` schema (see `common::ensure_schema`).
    pub fn new(pool: SqlitePool, collection: impl Into<String>, embedder: Arc<dyn LlmProvider>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            embedder,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .context("Failed to embed document")?;
        anyhow::ensure!(!embedding.is_empty(), "embedder returned an empty vector");
        Ok(embedding)
    }
}

/// Convert Vec<f32> to Vec<u8> (Little Endian bytes) for BLOB storage
fn f32_vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `1 - cosine similarity`, in `[0, 2]`. `None` when dimensions differ.
/// A zero vector is treated as orthogonal to everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return Some(1.0);
    }
    Some(1.0 - dot / (mag_a * mag_b))
}

fn decode_metadata(json: &str, id: &str) -> Metadata {
    serde_json::from_str(json).unwrap_or_else(|e| {
        warn!(id, "unreadable metadata, ignoring: {}", e);
        Metadata::new()
    })
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SimilarityRecord> {
    let id: String = row.try_get("id")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(SimilarityRecord {
        metadata: decode_metadata(&metadata_json, &id),
        document: row.try_get("document")?,
        id,
    })
}

#[async_trait::async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, records: Vec<SimilarityRecord>) -> Result<()> {
        // Embed the whole batch before writing so a failure leaves the store untouched
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let embedding = self.embed(&record.document).await?;
            let metadata_json =
                serde_json::to_string(&record.metadata).context("failed to serialize metadata")?;
            rows.push((record, metadata_json, f32_vec_to_bytes(&embedding)));
        }

        let created_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let mut inserted = 0;
        for (record, metadata_json, embedding) in &rows {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO documents (collection, id, document, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.collection)
            .bind(&record.id)
            .bind(&record.document)
            .bind(metadata_json)
            .bind(embedding)
            .bind(&created_at)
            .execute(&mut tx)
            .await
            .with_context(|| format!("failed to insert document {}", record.id))?;

            if result.rows_affected() == 0 {
                warn!(id = %record.id, "document id already exists, skipping");
            } else {
                inserted += 1;
            }
        }
        tx.commit().await.context("failed to commit documents")?;

        info!(collection = %self.collection, inserted, total = records.len(), "documents added");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed(text).await?;

        let rows = sqlx::query(
            "SELECT id, document, metadata_json, embedding FROM documents WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch documents for similarity search")?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.try_get("embedding")?;
            let record = record_from_row(row)?;
            match cosine_distance(&query_embedding, &bytes_to_f32_vec(&bytes)) {
                Some(distance) => hits.push(SearchHit {
                    id: record.id,
                    document: record.document,
                    metadata: record.metadata,
                    distance,
                }),
                None => warn!(id = %record.id, "embedding dimension mismatch, skipping"),
            }
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        debug!(candidates = rows.len(), returned = hits.len(), "similarity query done");
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<SimilarityRecord>> {
        let row = sqlx::query(
            "SELECT id, document, metadata_json FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch document")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete document {}", id))?;
        Ok(())
    }

    async fn update(&self, record: SimilarityRecord) -> Result<()> {
        let embedding = self.embed(&record.document).await?;
        let metadata_json =
            serde_json::to_string(&record.metadata).context("failed to serialize metadata")?;

        let result = sqlx::query(
            "UPDATE documents SET document = ?, metadata_json = ?, embedding = ? WHERE collection = ? AND id = ?",
        )
        .bind(&record.document)
        .bind(&metadata_json)
        .bind(f32_vec_to_bytes(&embedding))
        .bind(&self.collection)
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update document {}", record.id))?;

        if result.rows_affected() == 0 {
            warn!(id = %record.id, "update of unknown document id ignored");
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<SimilarityRecord>> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json FROM documents WHERE collection = ? ORDER BY created_at, id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch documents")?;

        rows.iter().map(record_from_row).collect()
    }
}
