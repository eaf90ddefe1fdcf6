//! Configuration module for askdocs.
//!
//! Handles loading, validating, and providing default configuration values.
//! Values come from a JSON file, then a small set of environment overrides.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_index_path() -> String {
    "./data/vectorstore.db".to_string()
}

fn default_chunk_size() -> usize {
    1500
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_search_top_k() -> usize {
    3
}

fn default_parse_workers() -> usize {
    4
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

const EMBEDDING_PROVIDERS: &[&str] = &["hashing", "openai"];
const LLM_PROVIDERS: &[&str] = &["openai"];

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Path of the persisted vector index (SQLite file).
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Maximum chunk length, in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between adjacent chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Size of the bounded pool used for parsing and chunking.
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,

    /// Where parse scratch files are written. System temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashing` (offline) or `openai`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            parse_workers: default_parse_workers(),
            scratch_dir: None,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used. Invalid JSON is.
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut cfg = if config_path.exists() {
            let data = std::fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            let cfg: Config = serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON in {}", config_path.display()))?;
            info!("Loaded configuration from {}", config_path.display());
            cfg
        } else {
            info!("{} not found, using defaults", config_path.display());
            Self::default()
        };

        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply `VECTORSTORE_PATH`, `CHUNK_SIZE` and `CHUNK_OVERLAP` overrides.
    ///
    /// The lookup is injected so tests need not touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("VECTORSTORE_PATH") {
            self.index_path = path;
        }
        if let Some(size) = lookup("CHUNK_SIZE") {
            self.chunk_size = size
                .trim()
                .parse()
                .with_context(|| format!("CHUNK_SIZE is not an integer: {size}"))?;
        }
        if let Some(overlap) = lookup("CHUNK_OVERLAP") {
            self.chunk_overlap = overlap
                .trim()
                .parse()
                .with_context(|| format!("CHUNK_OVERLAP is not an integer: {overlap}"))?;
        }
        Ok(())
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(self.parse_workers > 0, "parse_workers must be positive");
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()),
            "unknown embedding provider: {}",
            self.embedding.provider
        );
        anyhow::ensure!(
            LLM_PROVIDERS.contains(&self.llm.provider.as_str()),
            "unknown llm provider: {}",
            self.llm.provider
        );
        if self.index_path.is_empty() {
            warn!("index_path is empty; the index will not be persisted");
        }
        Ok(())
    }

    /// Scratch directory for parse temp files, if one is configured.
    #[must_use]
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.scratch_dir.as_ref().map(PathBuf::from)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
