use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::GenerationOptions;
use crate::index::IndexOptions;

/// looked up in the working directory when no config path is given
pub const DEFAULT_CONFIG_FILE: &str = "commit-rag.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub style: StyleConfig,
    pub index: IndexConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1".to_string(),
            model: "deepseek/deepseek-r1:free".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 400,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// exemplars retrieved per generation
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub max_subject_len: usize,
    pub allow_body: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            max_subject_len: 72,
            allow_body: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// json, json-lines or csv file of historical commits
    pub corpus_path: Option<PathBuf>,
    /// where the built index is cached between runs
    pub artifact_path: Option<PathBuf>,
    pub max_features: Option<usize>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// explicit file, else ./commit-rag.toml if present, else defaults;
    /// then `.env` and the OPENROUTER_* variables on top
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)?
                } else {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_overrides(
            env::var("OPENROUTER_API_KEY").ok(),
            env::var("OPENROUTER_MODEL").ok(),
        );
        Ok(config)
    }

    /// blank values leave the file settings alone
    pub fn apply_overrides(&mut self, api_key: Option<String>, model: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.generation.model = model;
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            timeout: Duration::from_secs(self.generation.timeout_secs),
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            max_features: self.index.max_features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            top_k = 5

            [index]
            corpus_path = "data/commits.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.index.corpus_path, Some(PathBuf::from("data/commits.jsonl")));
        assert_eq!(config.style, StyleConfig::default());
        assert_eq!(config.generation.api_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commit-rag.toml");
        fs::write(&path, "[style]\nmax_subject_len = 50\nallow_body = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.style.max_subject_len, 50);
        assert!(!config.style.allow_body);
    }

    #[test]
    fn load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[style\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(Some("sk-test".to_string()), Some("  ".to_string()));
        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.generation.model, GenerationConfig::default().model);

        config.apply_overrides(None, Some("openai/gpt-4o-mini".to_string()));
        assert_eq!(config.generation.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn api_key_is_not_written_back() {
        let mut config = Config::default();
        config.generation.api_key = None;
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("api_key"));
    }

    #[test]
    fn derives_runtime_options() {
        let mut config = Config::default();
        config.generation.timeout_secs = 5;
        config.index.max_features = Some(100);
        assert_eq!(config.generation_options().timeout, Duration::from_secs(5));
        assert_eq!(config.index_options().max_features, Some(100));
    }
}
