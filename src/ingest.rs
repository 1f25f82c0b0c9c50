// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline: load → normalize → chunk → embed → upsert, for one note.
//!
//! Failures never escape `process`; they come back as
//! [`IngestOutcome::Failed`] so one bad note cannot stop a scan or the
//! watcher loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::embedding::EmbeddingProvider;
use crate::errors::{Result, VaultError};
use crate::index::{chunk_id, ChunkMetadata, DocumentRecord, UpsertBatch, VectorIndex};
use crate::text::{normalize, Chunker};

/// Result of processing one note.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Chunks were embedded and written; `removed` stale entries were dropped.
    Indexed {
        path: String,
        chunks: usize,
        removed: usize,
    },
    /// Content hash matched the stored record; nothing was written.
    Unchanged { path: String },
    Failed { path: PathBuf, error: VaultError },
}

impl IngestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, IngestOutcome::Failed { .. })
    }
}

pub struct IngestionPipeline {
    vault_root: PathBuf,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    skip_unchanged: bool,
}

impl IngestionPipeline {
    pub fn new(
        vault_root: impl Into<PathBuf>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            vault_root: vault_root.into(),
            chunker,
            embedder,
            index,
            skip_unchanged: true,
        }
    }

    /// When disabled every call re-embeds, even if the note is unchanged.
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    /// Ingests the note at `path`. Never panics or propagates errors; the
    /// failure is logged with the path and returned.
    pub fn process(&self, path: &Path) -> IngestOutcome {
        match self.try_process(path) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    kind = error.kind(),
                    error = %error,
                    "ingestion failed"
                );
                IngestOutcome::Failed {
                    path: path.to_path_buf(),
                    error,
                }
            }
        }
    }

    /// Digest of the note content together with the settings that shape its
    /// entries. Changing the chunk size, overlap or model forces re-ingestion.
    fn fingerprint(&self, doc: &Document) -> String {
        let config = self.chunker.config();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.embedder.model_id().as_bytes());
        hasher.update(&[0]);
        hasher.update(&(config.chunk_size as u64).to_le_bytes());
        hasher.update(&(config.chunk_overlap as u64).to_le_bytes());
        hasher.update(doc.content_hash().as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn try_process(&self, path: &Path) -> Result<IngestOutcome> {
        let doc = Document::load(&self.vault_root, path)?;
        let content_hash = self.fingerprint(&doc);

        if self.skip_unchanged {
            if let Some(existing) = self.index.document(&doc.relative_path)? {
                if existing.content_hash == content_hash {
                    debug!(path = %doc.relative_path, "unchanged, skipping");
                    return Ok(IngestOutcome::Unchanged {
                        path: doc.relative_path,
                    });
                }
            }
        }

        let chunks = self.chunker.chunk(&normalize(&doc.content));
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let embeddings = self.embedder.embed_many(&texts)?;
        if embeddings.len() != texts.len() {
            return Err(VaultError::EmbeddingUnavailable(format!(
                "{} returned {} vectors for {} chunks",
                self.embedder.model_id(),
                embeddings.len(),
                texts.len()
            )));
        }

        let ids = chunks
            .iter()
            .map(|c| chunk_id(&doc.relative_path, c.ordinal))
            .collect();
        let metadatas = chunks
            .iter()
            .map(|c| ChunkMetadata {
                source: doc.relative_path.clone(),
                chunk: c.ordinal,
                modified: doc.modified,
            })
            .collect();
        let batch = UpsertBatch::new(ids, texts, metadatas, embeddings)?;

        let record = DocumentRecord {
            path: doc.relative_path.clone(),
            content_hash,
            modified: doc.modified,
            chunk_count: batch.len(),
        };
        let removed = self.index.sync_document(&record, &batch)?;

        info!(
            path = %doc.relative_path,
            chunks = batch.len(),
            removed,
            "ingested note"
        );
        Ok(IngestOutcome::Indexed {
            path: doc.relative_path,
            chunks: batch.len(),
            removed,
        })
    }
}
