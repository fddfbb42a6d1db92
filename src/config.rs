use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docrag_core::chunk::ChunkOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Json,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// The configured path; only valid for file-backed stores after validation.
    pub fn require_path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("store.path is required for this backend"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_preserve_paragraphs")]
    pub preserve_paragraphs: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap: default_overlap(),
            preserve_paragraphs: default_preserve_paragraphs(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_chunk_size: self.max_chunk_size,
            overlap: self.overlap,
            preserve_paragraphs: self.preserve_paragraphs,
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_preserve_paragraphs() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Results included in a chat prompt context.
    #[serde(default = "default_context_results")]
    pub context_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_results: default_context_results(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_context_results() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any `/embeddings` endpoint speaking the OpenAI request shape.
    #[serde(alias = "openai-compatible")]
    Openai,
    /// Another docrag server's `/api/embeddings` route.
    Server,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Reject responses whose vector length differs.
    #[serde(default)]
    pub expected_dimension: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub primary: Option<ProviderConfig>,
    #[serde(default)]
    pub secondary: Option<ProviderConfig>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Configured providers in the order they are tried.
    pub fn providers(&self) -> impl Iterator<Item = (&'static str, &ProviderConfig)> {
        [("primary", &self.primary), ("secondary", &self.secondary)]
            .into_iter()
            .filter_map(|(slot, p)| p.as_ref().map(|p| (slot, p)))
    }
}

fn default_max_retries() -> u32 {
    0
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    // Validate store
    match config.store.backend {
        StoreBackend::Sqlite | StoreBackend::Json if config.store.path.is_none() => {
            bail!("store.path is required for the sqlite and json backends");
        }
        _ => {}
    }

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chunk_size {
        bail!("chunking.overlap must be smaller than chunking.max_chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_results < 1 {
        bail!("retrieval.context_results must be >= 1");
    }

    // Validate embedding providers
    for (slot, provider) in config.embedding.providers() {
        if provider.base_url.trim().is_empty() {
            bail!("embedding.{}.base_url must not be empty", slot);
        }
        if provider.kind == ProviderKind::Openai {
            if provider.model.as_deref().map_or(true, |m| m.trim().is_empty()) {
                bail!("embedding.{}.model must be specified for kind 'openai'", slot);
            }
            if provider.api_key_env.is_none() {
                bail!("embedding.{}.api_key_env must be specified for kind 'openai'", slot);
            }
        }
        if provider.expected_dimension == Some(0) {
            bail!("embedding.{}.expected_dimension must be > 0", slot);
        }
    }

    Ok(())
}
