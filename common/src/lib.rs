/*!
common/src/lib.rs

Shared configuration types and DB helper functions for contentdesk.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default file with an optional override
- Helpers to initialize and migrate the SQLite database backing the similarity store
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Remote LLM endpoint config (OpenAI-compatible chat/embeddings API)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// LLM top-level config grouping the fallback endpoint and task-specific ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    // Fallback: single remote config
    pub remote: Option<RemoteLlmConfig>,
    // Task-specific configs
    pub summarization: Option<RemoteLlmConfig>,
    pub translation: Option<RemoteLlmConfig>,
    pub embedding: Option<RemoteLlmConfig>,
}

impl LlmConfig {
    /// Endpoint used for summaries and headlines (falls back to `remote`)
    pub fn summarization_endpoint(&self) -> Option<&RemoteLlmConfig> {
        self.summarization.as_ref().or(self.remote.as_ref())
    }

    /// Endpoint used for translation and refinement (falls back to `remote`)
    pub fn translation_endpoint(&self) -> Option<&RemoteLlmConfig> {
        self.translation.as_ref().or(self.remote.as_ref())
    }

    /// Endpoint used for document embeddings (falls back to `remote`)
    pub fn embedding_endpoint(&self) -> Option<&RemoteLlmConfig> {
        self.embedding.as_ref().or(self.remote.as_ref())
    }
}

/// Similarity store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Directory holding the SQLite database of indexed documents
    pub persist_directory: String,
    /// Logical collection name; several collections can share one database
    pub collection: String,
    /// Number of matches returned when the caller does not ask for a specific k
    pub default_results: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            persist_directory: "data/vectordb".to_string(),
            collection: "documents".to_string(),
            default_results: 5,
        }
    }
}

impl VectorStoreConfig {
    /// Path of the database file inside `persist_directory`
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.persist_directory).join("documents.db")
    }
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// "google" (public translate endpoint) or "llm" (prompted chat completion)
    pub backend: String,
    /// Override for the google backend endpoint
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
    /// Payload limit of the backend, in characters
    pub max_segment_chars: usize,
    /// Chunk size used to split user text before translation, in characters
    pub chunk_size: usize,
    /// The cache is cleared before a translation once it holds more entries than this
    pub cache_clear_threshold: usize,
    /// Run an LLM refinement pass over the raw translation
    pub refine: bool,
    /// Directory receiving translation_{lang}_{timestamp}.json records
    pub output_dir: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: "google".to_string(),
            endpoint: None,
            timeout_seconds: 20,
            max_segment_chars: 5000,
            chunk_size: 5000,
            cache_clear_threshold: 1000,
            refine: false,
            output_dir: ".".to_string(),
        }
    }
}

/// News search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub engine_url: String,
    /// Only results from these domains are kept
    pub news_sources: Vec<String>,
    /// Results from these domains are listed first
    pub priority_sources: Vec<String>,
    pub default_count: usize,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: "https://www.google.com/search".to_string(),
            news_sources: vec![
                "reuters.com".to_string(),
                "apnews.com".to_string(),
                "bbc.com".to_string(),
                "cnn.com".to_string(),
                "theguardian.com".to_string(),
            ],
            priority_sources: vec![
                "reuters.com".to_string(),
                "apnews.com".to_string(),
                "bbc.com".to_string(),
            ],
            default_count: 5,
            timeout_seconds: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Page scraping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Browser-like user agent; search engines serve stripped pages to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scraping: ScrapingConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    /// Missing files are skipped; with neither present the built-in defaults apply.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run SQL migrations using sqlx's migration macro.
/// Migrations live in the workspace-level `migrations` directory.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Create the similarity store schema if it does not exist yet.
/// Mirrors `migrations/0001_documents.sql`; used by tests and in-memory pools.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create documents table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection)")
        .execute(pool)
        .await
        .context("Failed to create documents index")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary, ensure the DB file exists
/// (attempting to create it if missing), and return a configured `SqlitePool`.
///
/// Example:
///   let pool = init_db_pool("data/vectordb/documents.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Creating the file up front surfaces permission problems with a clearer message
    // than the SQLite connection error would.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_string_with_defaults() {
        let toml = r#"
            [llm]
            adapter = "remote"

            [llm.remote]
            model = "llama3-70b-8192"
            api_key_env = "GROQ_API_KEY"

            [translation]
            backend = "llm"
            refine = true
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        let llm = cfg.llm.expect("llm section");
        assert_eq!(llm.adapter.as_deref(), Some("remote"));
        assert_eq!(
            llm.translation_endpoint().and_then(|r| r.model.as_deref()),
            Some("llama3-70b-8192")
        );
        assert_eq!(cfg.translation.backend, "llm");
        assert!(cfg.translation.refine);
        // Untouched keys keep their defaults
        assert_eq!(cfg.translation.max_segment_chars, 5000);
        assert_eq!(cfg.search.news_sources.len(), 5);
        assert_eq!(cfg.vector_store.collection, "documents");
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        tokio::fs::write(
            &default_path,
            "[translation]\nchunk_size = 4000\ncache_clear_threshold = 10\n\n[search]\ndefault_count = 3\n",
        )
        .await
        .expect("write default");
        tokio::fs::write(&override_path, "[translation]\nchunk_size = 800\n")
            .await
            .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load config");

        assert_eq!(cfg.translation.chunk_size, 800);
        assert_eq!(cfg.translation.cache_clear_threshold, 10);
        assert_eq!(cfg.search.default_count, 3);
    }

    #[tokio::test]
    async fn missing_files_fall_back_to_builtin_defaults() {
        let missing = Path::new("definitely/not/here.toml");
        let cfg = Config::load_with_defaults(Some(missing), None)
            .await
            .expect("load config");
        assert!(cfg.llm.is_none());
        assert_eq!(cfg.vector_store.persist_directory, "data/vectordb");
    }

    #[tokio::test]
    async fn db_pool_and_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("documents.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = init_db_pool(&db_path_str).await.expect("init pool");
        ensure_schema(&pool).await.expect("schema");
        // Idempotent
        ensure_schema(&pool).await.expect("schema again");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 0);
    }
}
