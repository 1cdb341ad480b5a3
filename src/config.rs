//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/gidx.sqlite"
//!
//! [chunking]
//! max_chars = 1500
//! min_chars = 500
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-large"
//! dims = 3072
//!
//! [vector_store]
//! provider = "pinecone"
//! host = "https://grants-abc123.svc.pinecone.io"
//!
//! [retrieval]
//! max_documents = 100
//! scan_ceiling = 1000
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use grant_index_core::chunk::{DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
use grant_index_core::client::DEFAULT_BATCH_SIZE;
use grant_index_core::ingest::{DEFAULT_EMBED_CONCURRENCY, MAX_EMBED_CONCURRENCY};
use grant_index_core::retrieval::{DEFAULT_MAX_DOCUMENTS, DEFAULT_SCAN_CEILING};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_min_chars() -> usize {
    DEFAULT_MIN_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Endpoint override. OpenAI takes the full embeddings URL, Ollama its
    /// base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_concurrency() -> usize {
    DEFAULT_EMBED_CONCURRENCY
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    /// `pinecone`, or `memory` for a process-local store.
    #[serde(default = "default_store_provider")]
    pub provider: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            host: None,
            namespace: None,
            api_key_env: default_api_key_env(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_store_provider() -> String {
    "pinecone".to_string()
}
fn default_api_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_scan_ceiling")]
    pub scan_ceiling: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_documents: DEFAULT_MAX_DOCUMENTS,
            scan_ceiling: DEFAULT_SCAN_CEILING,
        }
    }
}

fn default_max_documents() -> usize {
    DEFAULT_MAX_DOCUMENTS
}
fn default_scan_ceiling() -> usize {
    DEFAULT_SCAN_CEILING
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.min_chars == 0 || config.chunking.min_chars > config.chunking.max_chars {
        anyhow::bail!("chunking.min_chars must be in 1..=chunking.max_chars");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if !(1..=MAX_EMBED_CONCURRENCY).contains(&config.embedding.concurrency) {
        anyhow::bail!(
            "embedding.concurrency must be in 1..={}",
            MAX_EMBED_CONCURRENCY
        );
    }

    // Validate vector store
    match config.vector_store.provider.as_str() {
        "pinecone" => {
            if config.vector_store.host.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("vector_store.host must be set when provider is 'pinecone'");
            }
        }
        "memory" => {}
        other => anyhow::bail!(
            "Unknown vector store provider: '{}'. Must be pinecone or memory.",
            other
        ),
    }
    if !(1..=DEFAULT_BATCH_SIZE).contains(&config.vector_store.batch_size) {
        anyhow::bail!(
            "vector_store.batch_size must be in 1..={}",
            DEFAULT_BATCH_SIZE
        );
    }

    // Validate retrieval
    if config.retrieval.max_documents == 0 {
        anyhow::bail!("retrieval.max_documents must be >= 1");
    }
    if config.retrieval.scan_ceiling < 2 {
        anyhow::bail!("retrieval.scan_ceiling must be >= 2");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/gidx.sqlite"

[vector_store]
provider = "memory"

[server]
bind = "127.0.0.1:7340"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.chunking.max_chars, 1500);
        assert_eq!(cfg.chunking.min_chars, 500);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.concurrency, 4);
        assert_eq!(cfg.vector_store.batch_size, 100);
        assert_eq!(cfg.vector_store.api_key_env, "PINECONE_API_KEY");
        assert_eq!(cfg.retrieval.max_documents, 100);
        assert_eq!(cfg.retrieval.scan_ceiling, 1000);
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let text = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("embedding.dims"), "{}", err);

        let text = format!(
            "{}\n[embedding]\nprovider = \"openai\"\ndims = 3072\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("embedding.model"), "{}", err);
    }

    #[test]
    fn test_pinecone_requires_host() {
        let text = MINIMAL.replace("provider = \"memory\"", "provider = \"pinecone\"");
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("vector_store.host"), "{}", err);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let text = format!("{}\n[chunking]\nmax_chars = 100\nmin_chars = 200\n", MINIMAL);
        assert!(parse_config(&text).is_err());

        let text = MINIMAL.replace(
            "provider = \"memory\"",
            "provider = \"memory\"\nbatch_size = 500",
        );
        assert!(parse_config(&text).is_err());

        let text = format!("{}\n[embedding]\nconcurrency = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let text = format!("{}\n[embedding]\nprovider = \"local\"\n", MINIMAL);
        assert!(parse_config(&text)
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }
}
