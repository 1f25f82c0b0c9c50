// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index contract and its SQLite implementation.
//!
//! Entries are keyed by `<relative path>_chunk_<ordinal>`, so re-ingesting a
//! note overwrites the same rows in place. The index also keeps one record
//! per document so that trailing chunks left over from a longer previous
//! version can be removed.

pub mod location;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

pub use location::{default_base_dir, vault_key, StorageLocation, DEFAULT_COLLECTION};
pub use sqlite::SqliteIndex;

/// Builds the identity of the chunk at `ordinal` in the note at `relative_path`.
pub fn chunk_id(relative_path: &str, ordinal: usize) -> String {
    format!("{}_chunk_{}", relative_path, ordinal)
}

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Note path relative to the vault root.
    pub source: String,
    /// Ordinal of the chunk within its note.
    pub chunk: usize,
    /// Note modification time (seconds since epoch) when the chunk was built.
    pub modified: i64,
}

/// Parallel sequences for one upsert call. All four have the same length.
#[derive(Debug, Clone, Default)]
pub struct UpsertBatch {
    ids: Vec<String>,
    texts: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
    embeddings: Vec<Vec<f32>>,
}

impl UpsertBatch {
    pub fn new(
        ids: Vec<String>,
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let len = ids.len();
        if texts.len() != len || metadatas.len() != len || embeddings.len() != len {
            return Err(VaultError::IndexWriteFailure(format!(
                "batch length mismatch: {} ids, {} texts, {} metadatas, {} embeddings",
                len,
                texts.len(),
                metadatas.len(),
                embeddings.len()
            )));
        }
        Ok(Self {
            ids,
            texts,
            metadatas,
            embeddings,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ChunkMetadata, &[f32])> + '_ {
        self.ids
            .iter()
            .zip(&self.texts)
            .zip(&self.metadatas)
            .zip(&self.embeddings)
            .map(|(((id, text), meta), emb)| (id.as_str(), text.as_str(), meta, emb.as_slice()))
    }
}

/// A persisted chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// One nearest-neighbor match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance (`1 - cosine similarity`); smaller is closer.
    pub distance: f32,
}

/// Per-note bookkeeping used for change detection and orphan cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub path: String,
    /// Digest of the content plus the chunking and model settings that
    /// produced the stored entries.
    pub content_hash: String,
    pub modified: i64,
    pub chunk_count: usize,
}

/// Persistent collection with upsert-by-id and k-nearest-neighbor query.
///
/// Implementations serialize their own writes; callers may share one
/// instance across threads without further locking.
pub trait VectorIndex: Send + Sync {
    /// Creates or fully replaces every entry in `batch`. All or nothing.
    fn upsert(&self, batch: &UpsertBatch) -> Result<()>;

    /// Upserts a note's chunks, removes its entries at ordinals past the new
    /// chunk count and stores `record`, in one transaction. Returns how many
    /// stale entries were removed.
    fn sync_document(&self, record: &DocumentRecord, batch: &UpsertBatch) -> Result<usize>;

    fn document(&self, path: &str) -> Result<Option<DocumentRecord>>;

    /// Returns up to `k` entries ordered nearest-first.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    fn get(&self, id: &str) -> Result<Option<IndexEntry>>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize>;

    /// Number of tracked notes.
    fn document_count(&self) -> Result<usize>;
}
