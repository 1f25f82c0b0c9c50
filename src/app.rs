// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition root. Builds the embedder and the index once and hands shared
//! handles to the pipeline, the watcher and the retrieval service.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, EmbeddingProviderType};
use crate::embedding::{
    CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder, HashingProvider,
};
use crate::errors::{Result, VaultError};
use crate::index::{SqliteIndex, StorageLocation, VectorIndex};
use crate::ingest::IngestionPipeline;
use crate::retrieval::RetrievalService;
use crate::text::Chunker;
use crate::watcher::{VaultScanner, VaultWatcher, WatcherOptions};

/// Snapshot of the collection backing a vault.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub vault: PathBuf,
    pub vault_key: String,
    pub database: PathBuf,
    pub collection: String,
    pub model: String,
    pub dimension: Option<usize>,
    pub documents: usize,
    pub entries: usize,
}

pub struct App {
    config: Config,
    vault: PathBuf,
    location: StorageLocation,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<SqliteIndex>,
    pipeline: Arc<IngestionPipeline>,
}

impl App {
    /// Validates `config`, opens the collection and constructs the embedder.
    ///
    /// The embedding model itself is loaded lazily on first use.
    pub fn build(config: Config) -> Result<Self> {
        config.validate()?;
        let vault = config.vault_path()?;
        if !vault.is_dir() {
            return Err(VaultError::Config(format!(
                "vault path is not a readable directory: {}",
                vault.display()
            )));
        }
        let vault = vault
            .canonicalize()
            .map_err(|e| VaultError::load(vault, e))?;

        let location = StorageLocation::resolve(&config.index_dir(), &vault, config.collection());
        let embedder = build_embedder(&config)?;
        let index = Arc::new(SqliteIndex::open(&location.db_path)?);
        index.record_model(embedder.model_id())?;
        info!(
            vault = %vault.display(),
            database = %location.db_path.display(),
            model = embedder.model_id(),
            "opened collection"
        );

        let pipeline = Arc::new(
            IngestionPipeline::new(
                vault.clone(),
                Chunker::new(config.chunking.to_chunk_config()?),
                embedder.clone(),
                index.clone(),
            )
            .with_skip_unchanged(config.index.skip_unchanged()),
        );

        Ok(Self {
            config,
            vault,
            location,
            embedder,
            index,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn pipeline(&self) -> Arc<IngestionPipeline> {
        self.pipeline.clone()
    }

    pub fn index(&self) -> Arc<SqliteIndex> {
        self.index.clone()
    }

    pub fn scanner(&self) -> VaultScanner {
        VaultScanner::new(&self.vault).with_excludes(self.config.index.exclude_paths())
    }

    pub fn retrieval(&self) -> RetrievalService {
        RetrievalService::new(self.embedder.clone(), self.index.clone())
    }

    pub fn watcher(&self) -> VaultWatcher {
        let options =
            WatcherOptions::from_config(&self.config.watch, self.config.index.exclude_paths());
        VaultWatcher::new(self.pipeline.clone(), options)
    }

    pub fn status(&self) -> Result<IndexStatus> {
        Ok(IndexStatus {
            vault: self.vault.clone(),
            vault_key: self.location.vault_key.clone(),
            database: self.location.db_path.clone(),
            collection: self.config.collection().to_string(),
            model: self.embedder.model_id().to_string(),
            dimension: self.index.dimension()?,
            documents: self.index.document_count()?,
            entries: self.index.count()?,
        })
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embeddings = &config.embeddings;
    let provider: Arc<dyn EmbeddingProvider> = match embeddings.provider() {
        EmbeddingProviderType::Builtin => Arc::new(FastEmbedder::new(
            EmbeddingProviderConfig::for_model(Some(embeddings.model()), embeddings.batch_size)?,
        )),
        EmbeddingProviderType::Command => {
            let provider = CommandProvider::new(
                embeddings.command().to_string(),
                embeddings.model().to_string(),
            );
            match embeddings.batch_size {
                Some(size) => Arc::new(provider.with_batch_size(size)),
                None => Arc::new(provider),
            }
        }
        EmbeddingProviderType::Hashing => Arc::new(HashingProvider::new(embeddings.dimension())),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(vault: &Path, index_dir: &Path) -> Config {
        let mut config = Config::default();
        config.vault_path = Some(vault.to_path_buf());
        config.index_dir = Some(index_dir.to_path_buf());
        config.embeddings.provider = Some(EmbeddingProviderType::Hashing);
        config.embeddings.dimension = Some(64);
        config
    }

    #[test]
    fn missing_vault_is_config_error() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir.path().join("nope"), dir.path());
        assert!(matches!(App::build(cfg), Err(VaultError::Config(_))));
    }

    #[test]
    fn builds_and_reports_status() {
        let vault = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        fs::write(vault.path().join("a.md"), "Battery life matters.").unwrap();

        let app = App::build(config(vault.path(), data.path())).unwrap();
        assert!(app.status().unwrap().database.starts_with(data.path()));

        for path in app.scanner().list_notes() {
            assert!(!app.pipeline().process(&path).is_failure());
        }
        let status = app.status().unwrap();
        assert_eq!(status.documents, 1);
        assert_eq!(status.entries, 1);
        assert_eq!(status.dimension, Some(64));
        assert_eq!(status.model, "hashing-64");
        assert_eq!(status.collection, "obsidian_notes");
    }

    #[test]
    fn same_vault_reuses_collection() {
        let vault = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let first = App::build(config(vault.path(), data.path())).unwrap();
        let second = App::build(config(vault.path(), data.path())).unwrap();
        assert_eq!(
            first.status().unwrap().database,
            second.status().unwrap().database
        );
    }
}
