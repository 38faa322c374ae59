/*
contentdesk - command-line content assistant.
Each subcommand runs one workflow (stats, chunking, summary, headline, news, translation, similarity search).
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{init_db_pool, run_migrations, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use contentdesk::assistant::{Assistant, AssistantSettings};
use contentdesk::llm::remote::RemoteLlmProvider;
use contentdesk::llm::{LlmProvider, OfflineProvider};
use contentdesk::news::NewsSearch;
use contentdesk::scraping::build_client;
use contentdesk::text::{format_stats, split_into_chunks, text_stats};
use contentdesk::translation::google::{GoogleTranslateBackend, DEFAULT_ENDPOINT};
use contentdesk::translation::llm::LlmTranslationBackend;
use contentdesk::translation::{TranslationBackend, TranslationCache};
use contentdesk::vector_store::{SimilaritySearch, SqliteVectorIndex};

#[derive(Parser, Debug)]
#[command(name = "contentdesk", about = "Summarize, translate and search content")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Text given inline, from a file, or on stdin when neither is set.
#[derive(clap::Args, Debug)]
struct TextInput {
    /// Text to process
    text: Option<String>,

    /// Read the text from this file
    #[arg(long, value_name = "FILE", conflicts_with = "text")]
    file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Character, word and sentence counts
    Stats(TextInput),
    /// Split text into sentence-aligned chunks
    Chunk {
        #[command(flatten)]
        input: TextInput,
        #[arg(long, default_value_t = contentdesk::text::DEFAULT_CHUNK_SIZE)]
        max_chars: usize,
    },
    /// Summarize text (also stores it for similarity search)
    Summarize(TextInput),
    /// Generate a short headline
    Headline(TextInput),
    /// Search recent news and summarize each article
    News {
        topic: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        count: Option<usize>,
    },
    /// Translate text into a supported language
    Translate {
        /// Target language code (en, es, fr, de, it, pt, ru, zh, ja, ko, bn)
        #[arg(long, short)]
        lang: String,
        #[command(flatten)]
        input: TextInput,
        /// Run the LLM refinement pass even if disabled in config
        #[arg(long)]
        refine: bool,
    },
    /// Find stored documents similar to a query
    Search {
        query: String,
        #[arg(long, short)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr keeps stdout clean for results)
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // API keys may live in a .env file
    dotenv::dotenv().ok();

    let config = load_config(args.config.as_deref()).await?;

    match args.command {
        Command::Stats(input) => {
            let text = read_input(input).await?;
            println!("{}", format_stats(&text_stats(&text)));
        }
        Command::Chunk { input, max_chars } => {
            let text = read_input(input).await?;
            let chunks = split_into_chunks(&text, max_chars.max(1));
            for (i, chunk) in chunks.iter().enumerate() {
                println!("--- chunk {} ({} chars) ---\n{}", i + 1, chunk.chars().count(), chunk);
            }
        }
        Command::Summarize(input) => {
            let text = read_input(input).await?;
            let assistant = build_assistant(&config, false).await?;
            let summary = assistant.summarize(&text).await?;
            println!("{}", summary.to_markdown());
        }
        Command::Headline(input) => {
            let text = read_input(input).await?;
            let assistant = build_assistant(&config, false).await?;
            println!("{}", assistant.headline(&text).await);
        }
        Command::News {
            topic,
            location,
            count,
        } => {
            let assistant = build_assistant(&config, false).await?;
            let report = assistant
                .analyze_news(&topic, location.as_deref(), count)
                .await;
            println!("{}", report);
        }
        Command::Translate {
            lang,
            input,
            refine,
        } => {
            let text = read_input(input).await?;
            let assistant = build_assistant(&config, refine || config.translation.refine).await?;
            let report = assistant.translate(&text, &lang).await?;

            eprintln!("{}", format_stats(&report.stats));
            if report.degraded {
                warn!("some chunks could not be translated and were kept as-is");
            }
            println!("{}", report.final_text());
            if let Some(path) = &report.record_path {
                eprintln!("saved to {}", path.display());
            }
        }
        Command::Search { query, k } => {
            let assistant = build_assistant(&config, false).await?;
            let hits = assistant.search_similar(&query, k).await?;
            if hits.is_empty() {
                println!("No similar documents found.");
            }
            for hit in hits {
                println!("[{}] distance {:.4}\n{}\n", hit.id, hit.distance, hit.document);
            }
        }
    }

    Ok(())
}

async fn load_config(explicit: Option<&std::path::Path>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override_file = ?override_path, "configuration loaded");
    Ok(config)
}

async fn read_input(input: TextInput) -> Result<String> {
    if let Some(text) = input.text {
        return Ok(text);
    }
    if let Some(path) = input.file {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read text from stdin")?;
    Ok(text)
}

#[derive(Debug, Clone, Copy)]
enum LlmTask {
    Summarization,
    Translation,
    Embedding,
}

/// Provider for one task. Adapter `none` (or no `[llm]` section) yields the
/// offline provider so every workflow falls back to its non-LLM path.
fn create_llm_provider(config: &Config, task: LlmTask) -> Result<Arc<dyn LlmProvider>> {
    let Some(llm_config) = config.llm.as_ref() else {
        return Ok(Arc::new(OfflineProvider));
    };

    let adapter = llm_config.adapter.as_deref().unwrap_or("remote");
    match adapter {
        "remote" => {
            let endpoint = match task {
                LlmTask::Summarization => llm_config.summarization_endpoint(),
                LlmTask::Translation => llm_config.translation_endpoint(),
                LlmTask::Embedding => llm_config.embedding_endpoint(),
            };
            let remote_config = endpoint.cloned().unwrap_or_default();
            let provider = RemoteLlmProvider::from_config(&remote_config)?;
            info!(task = ?task, model = provider.model(), "LLM provider initialized");
            Ok(Arc::new(provider))
        }
        "none" => Ok(Arc::new(OfflineProvider)),
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}

/// Same as [`create_llm_provider`], but a missing key degrades to offline
/// mode instead of aborting.
fn llm_or_offline(config: &Config, task: LlmTask) -> Arc<dyn LlmProvider> {
    create_llm_provider(config, task).unwrap_or_else(|e| {
        warn!(task = ?task, "LLM unavailable, using fallbacks: {:#}", e);
        Arc::new(OfflineProvider)
    })
}

fn create_translation_backend(config: &Config) -> Result<Arc<dyn TranslationBackend>> {
    let settings = &config.translation;
    match settings.backend.as_str() {
        "google" => {
            let endpoint = settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
            let backend =
                GoogleTranslateBackend::new(endpoint, settings.timeout_seconds, &config.scraping.user_agent)?;
            Ok(Arc::new(backend))
        }
        "llm" => Ok(Arc::new(LlmTranslationBackend::new(
            llm_or_offline(config, LlmTask::Translation),
        ))),
        other => anyhow::bail!("Unknown translation backend: {}", other),
    }
}

async fn build_assistant(config: &Config, refine: bool) -> Result<Assistant> {
    let db_path = config.vector_store.database_path();
    let db_path = db_path.to_string_lossy().to_string();
    info!(db_path = %db_path, "opening similarity store");

    let pool = match init_db_pool(&db_path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %db_path, "failed to initialize database pool");
            return Err(e);
        }
    };
    run_migrations(&pool).await?;

    let index = SqliteVectorIndex::new(
        pool,
        config.vector_store.collection.clone(),
        llm_or_offline(config, LlmTask::Embedding),
    );

    let cache = TranslationCache::new(create_translation_backend(config)?)
        .with_max_segment_chars(config.translation.max_segment_chars);

    let assistant = Assistant::new(
        llm_or_offline(config, LlmTask::Summarization),
        cache,
        SimilaritySearch::new(Arc::new(index)),
        NewsSearch::from_config(&config.search)?,
        build_client(config.scraping.timeout_seconds, &config.scraping.user_agent)?,
        AssistantSettings::from_config(config),
    );

    Ok(if refine {
        assistant.with_refiner(llm_or_offline(config, LlmTask::Translation))
    } else {
        assistant
    })
}
