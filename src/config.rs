// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for vault-rag
//!
//! Loads configuration from an explicit path, `.vaultragrc.toml` in the
//! current directory, or `~/.config/vault-rag/config.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, VaultError};
use crate::index::{default_base_dir, DEFAULT_COLLECTION};
use crate::retrieval::DEFAULT_TOP_K;
use crate::text::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".vaultragrc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// fastembed model loaded in-process
    #[default]
    Builtin,
    /// External command speaking JSON over stdin/stdout
    Command,
    /// Deterministic feature hashing, no model download
    Hashing,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 500)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 100)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    pub fn to_chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(self.chunk_size(), self.chunk_overlap())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier
    pub model: Option<String>,
    /// Command to execute for the command provider
    pub command: Option<String>,
    /// Vector dimension for the hashing provider
    pub dimension: Option<usize>,
    /// Texts per embedding call
    pub batch_size: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get hashing dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension
            .unwrap_or(crate::embedding::DEFAULT_EMBEDDING_DIM)
    }
}

/// Watcher configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a changed note is re-ingested
    pub debounce_ms: Option<u64>,
    /// Concurrent ingestion workers
    pub workers: Option<usize>,
    /// How long shutdown waits for in-flight ingestion
    pub drain_timeout_secs: Option<u64>,
}

impl WatchConfig {
    /// Get debounce (defaults to 500ms)
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(500))
    }

    /// Get worker count (defaults to 4)
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    /// Get drain timeout (defaults to 10s)
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs.unwrap_or(10))
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Skip notes whose content hash is unchanged
    pub skip_unchanged: Option<bool>,
    /// Path fragments to exclude from scanning and watching
    pub exclude_paths: Vec<String>,
}

impl IndexConfig {
    /// Get skip_unchanged (defaults to true)
    pub fn skip_unchanged(&self) -> bool {
        self.skip_unchanged.unwrap_or(true)
    }

    /// Get exclude paths
    pub fn exclude_paths(&self) -> &[String] {
        &self.exclude_paths
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned per query
    pub top_k: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 2)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }
}

/// Configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the notes vault
    pub vault_path: Option<PathBuf>,
    /// Base directory for persisted collections
    pub index_dir: Option<PathBuf>,
    /// Collection name
    pub collection: Option<String>,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. `explicit` path, which must exist and parse
    /// 2. .vaultragrc.toml in current directory
    /// 3. ~/.config/vault-rag/config.toml
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path).map_err(|e| {
                VaultError::Config(format!("failed to read {}: {}", path.display(), e))
            })?;
            return Self::parse(&content, path);
        }

        if let Some(config) = Self::load_from_path(Path::new(LOCAL_CONFIG_FILE)) {
            return Ok(config);
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("vault-rag").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content, path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring config file");
                None
            }
        }
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| VaultError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Vault root; required.
    pub fn vault_path(&self) -> Result<&Path> {
        self.vault_path
            .as_deref()
            .ok_or_else(|| VaultError::Config("vault_path is not set".into()))
    }

    /// Get index base directory (defaults to the platform data dir)
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir.clone().unwrap_or_else(default_base_dir)
    }

    /// Get collection name (defaults to "obsidian_notes")
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.chunking.to_chunk_config()?;
        if self.watch.workers() == 0 {
            return Err(VaultError::Config("watch.workers must be greater than 0".into()));
        }
        if self.embeddings.provider() == EmbeddingProviderType::Hashing
            && self.embeddings.dimension() == 0
        {
            return Err(VaultError::Config("embeddings.dimension must be greater than 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size(), 500);
        assert_eq!(config.chunking.chunk_overlap(), 100);
        assert_eq!(config.retrieval.top_k(), 2);
        assert_eq!(config.collection(), "obsidian_notes");
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Builtin);
        assert!(config.index.skip_unchanged());
        assert_eq!(config.watch.workers(), 4);
        assert!(config.vault_path().is_err());
    }

    #[test]
    fn parses_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
vault_path = "/notes"
collection = "drones"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embeddings]
provider = "hashing"
dimension = 64

[watch]
debounce_ms = 50
workers = 2

[index]
exclude_paths = ["templates/"]

[retrieval]
top_k = 5
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.vault_path().unwrap(), Path::new("/notes"));
        assert_eq!(config.collection(), "drones");
        assert_eq!(config.chunking.chunk_size(), 200);
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hashing);
        assert_eq!(config.embeddings.dimension(), 64);
        assert_eq!(config.watch.debounce(), Duration::from_millis(50));
        assert_eq!(config.index.exclude_paths(), ["templates/".to_string()]);
        assert_eq!(config.retrieval.top_k(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn validate_rejects_bad_overlap() {
        let config = Config {
            chunking: ChunkingConfig {
                chunk_size: Some(10),
                chunk_overlap: Some(10),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = Config {
            watch: WatchConfig {
                workers: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
