use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// JSON record written after each translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub original_text: String,
    pub translation: String,
    pub target_language: String,
    /// ISO-8601 local time
    pub timestamp: String,
}

/// Write `translation_{lang}_{YYYYmmdd_HHMMSS}.json` under `dir` and return its path.
///
/// The directory is created when missing. Non-ASCII text is written as-is.
pub async fn save_translation(
    dir: &Path,
    original: &str,
    translation: &str,
    target_language: &str,
) -> Result<PathBuf> {
    let now = Local::now();
    let record = TranslationRecord {
        original_text: original.to_string(),
        translation: translation.to_string(),
        target_language: target_language.to_string(),
        timestamp: now.to_rfc3339(),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let path = dir.join(format!(
        "translation_{}_{}.json",
        target_language,
        now.format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_string_pretty(&record).context("failed to serialize translation record")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), "translation saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_pretty_unescaped_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_translation(dir.path(), "Hello", "হ্যালো", "bn").await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("translation_bn_"));
        assert!(name.ends_with(".json"));
        // translation_bn_ + YYYYmmdd_HHMMSS + .json
        assert_eq!(name.len(), "translation_bn_".len() + 15 + ".json".len());

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("হ্যালো"));
        assert!(raw.contains("\n  \"original_text\": \"Hello\""));

        let record: TranslationRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.target_language, "bn");
        assert_eq!(record.translation, "হ্যালো");
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out/translations");
        let path = save_translation(&nested, "a", "b", "fr").await.unwrap();
        assert!(path.starts_with(&nested));
    }
}
