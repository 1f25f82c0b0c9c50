// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector index.
//!
//! Embeddings are stored as little-endian f32 blobs and searched by brute
//! force cosine distance. A single connection behind a mutex serializes
//! writers; every upsert runs inside one transaction. File-backed indexes
//! read through a second WAL connection so queries do not wait on writes.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChunkMetadata, DocumentRecord, IndexEntry, QueryHit, UpsertBatch, VectorIndex};
use crate::errors::{Result, VaultError};

const SCHEMA_VERSION: &str = "1";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteIndex {
    conn: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteIndex {
    /// Opens or creates the collection at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VaultError::IndexWriteFailure(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        let mut index = Self {
            conn: Mutex::new(conn),
            reader: None,
            path,
        };
        index.init_schema()?;

        let reader = Connection::open(&index.path)?;
        reader.busy_timeout(BUSY_TIMEOUT)?;
        reader.pragma_update(None, "query_only", true)?;
        index.reader = Some(Mutex::new(reader));
        Ok(index)
    }

    /// Opens a throwaway in-memory collection.
    pub fn open_in_memory() -> Result<Self> {
        let index = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            reader: None,
            path: PathBuf::from(":memory:"),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_path_ordinal
                ON entries(path, ordinal);

            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                modified INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL
            );
            "#,
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Embedding dimension fixed by the first write, if any.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let conn = self.read_lock()?;
        Ok(get_meta(&conn, "dimension")?.and_then(|v| v.parse().ok()))
    }

    /// Records which model writes to this collection, warning when it changes.
    pub fn record_model(&self, model_id: &str) -> Result<()> {
        let conn = self.lock()?;
        if let Some(previous) = get_meta(&conn, "model")? {
            if previous != model_id {
                warn!(
                    previous = %previous,
                    current = %model_id,
                    "embedding model changed; existing vectors may not be comparable"
                );
            }
        }
        set_meta(&conn, "model", model_id)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::IndexWriteFailure("index connection lock poisoned".into()))
    }

    /// The read connection, or the writer for in-memory indexes.
    fn read_lock(&self) -> Result<MutexGuard<'_, Connection>> {
        match &self.reader {
            Some(reader) => reader
                .lock()
                .map_err(|_| VaultError::IndexReadFailure("index reader lock poisoned".into())),
            None => self.lock(),
        }
    }

    fn write_entries(tx: &Transaction<'_>, batch: &UpsertBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let stored: Option<usize> = get_meta(tx, "dimension")?.and_then(|v| v.parse().ok());
        let mut expected = stored;

        let mut stmt = tx.prepare(
            r#"
            INSERT INTO entries (id, path, ordinal, text, metadata, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                ordinal = excluded.ordinal,
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding
            "#,
        )?;

        for (id, text, metadata, embedding) in batch.iter() {
            match expected {
                Some(dim) if dim != embedding.len() => {
                    return Err(VaultError::DimensionMismatch {
                        expected: dim,
                        actual: embedding.len(),
                    });
                }
                None => expected = Some(embedding.len()),
                _ => {}
            }

            let metadata_json = serde_json::to_string(metadata)
                .map_err(|e| VaultError::IndexWriteFailure(e.to_string()))?;
            stmt.execute(params![
                id,
                metadata.source,
                metadata.chunk as i64,
                text,
                metadata_json,
                embedding_to_blob(embedding),
            ])?;
        }

        if stored.is_none() {
            if let Some(dim) = expected {
                set_meta(tx, "dimension", &dim.to_string())?;
            }
        }
        Ok(())
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&self, batch: &UpsertBatch) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::write_entries(&tx, batch)?;
        tx.commit()?;
        debug!(count = batch.len(), "upserted entries");
        Ok(())
    }

    fn sync_document(&self, record: &DocumentRecord, batch: &UpsertBatch) -> Result<usize> {
        if let Some((id, ..)) = batch.iter().find(|(_, _, meta, _)| meta.source != record.path) {
            return Err(VaultError::IndexWriteFailure(format!(
                "entry {} does not belong to {}",
                id, record.path
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::write_entries(&tx, batch)?;
        let removed = tx.execute(
            "DELETE FROM entries WHERE path = ?1 AND ordinal >= ?2",
            params![record.path, record.chunk_count as i64],
        )?;
        tx.execute(
            r#"
            INSERT INTO documents (path, content_hash, modified, chunk_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path) DO UPDATE SET
                content_hash = excluded.content_hash,
                modified = excluded.modified,
                chunk_count = excluded.chunk_count
            "#,
            params![
                record.path,
                record.content_hash,
                record.modified,
                record.chunk_count as i64
            ],
        )?;

        tx.commit()?;
        Ok(removed)
    }

    fn document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.read_lock()?;
        conn.query_row(
            "SELECT path, content_hash, modified, chunk_count FROM documents WHERE path = ?1",
            params![path],
            |row| {
                Ok(DocumentRecord {
                    path: row.get(0)?,
                    content_hash: row.get(1)?,
                    modified: row.get(2)?,
                    chunk_count: row.get::<_, i64>(3)? as usize,
                })
            },
        )
        .optional()
        .map_err(read_failure)
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Rows are copied out so the connection is released before scoring.
        let rows = {
            let conn = self.read_lock()?;
            let stored_dim =
                get_meta(&conn, "dimension")?.and_then(|v| v.parse::<usize>().ok());
            if let Some(dim) = stored_dim {
                if dim != embedding.len() {
                    return Err(VaultError::DimensionMismatch {
                        expected: dim,
                        actual: embedding.len(),
                    });
                }
            }

            let mut stmt = conn
                .prepare("SELECT id, text, metadata, embedding FROM entries")
                .map_err(read_failure)?;
            let rows = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        blob,
                    ))
                })
                .map_err(read_failure)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(read_failure)?;
            rows
        };

        let mut hits = Vec::with_capacity(rows.len());
        for (id, text, metadata_json, blob) in rows {
            let stored = blob_to_embedding(&blob);
            hits.push(QueryHit {
                distance: cosine_distance(embedding, &stored),
                metadata: parse_metadata(&metadata_json)?,
                id,
                text,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn get(&self, id: &str) -> Result<Option<IndexEntry>> {
        let conn = self.read_lock()?;
        let row = conn
            .query_row(
                "SELECT id, text, metadata, embedding FROM entries WHERE id = ?1",
                params![id],
                |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        blob,
                    ))
                },
            )
            .optional()
            .map_err(read_failure)?;

        row.map(|(id, text, metadata_json, blob)| {
            Ok(IndexEntry {
                id,
                text,
                metadata: parse_metadata(&metadata_json)?,
                embedding: blob_to_embedding(&blob),
            })
        })
        .transpose()
    }

    fn count(&self) -> Result<usize> {
        let conn = self.read_lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(read_failure)?;
        Ok(count as usize)
    }

    fn document_count(&self) -> Result<usize> {
        let conn = self.read_lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(read_failure)?;
        Ok(count as usize)
    }
}

fn read_failure(err: rusqlite::Error) -> VaultError {
    VaultError::IndexReadFailure(err.to_string())
}

fn parse_metadata(json: &str) -> Result<ChunkMetadata> {
    serde_json::from_str(json).map_err(|e| VaultError::IndexReadFailure(e.to_string()))
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(read_failure)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO meta (key, value)
        VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![key, value],
    )?;
    Ok(())
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `1 - cosine similarity`; zero vectors sit at distance 1.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let distance = 1.0 - dot / (norm_a * norm_b);
    // Overflowing vectors rank last.
    if distance.is_nan() {
        return 2.0;
    }
    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::chunk_id;
    use tempfile::tempdir;

    fn batch_for(path: &str, vectors: &[Vec<f32>]) -> UpsertBatch {
        let ids = (0..vectors.len()).map(|i| chunk_id(path, i)).collect();
        let texts = (0..vectors.len()).map(|i| format!("{} text {}", path, i)).collect();
        let metas = (0..vectors.len())
            .map(|i| ChunkMetadata {
                source: path.to_string(),
                chunk: i,
                modified: 1000,
            })
            .collect();
        UpsertBatch::new(ids, texts, metas, vectors.to_vec()).unwrap()
    }

    fn record(path: &str, chunk_count: usize) -> DocumentRecord {
        DocumentRecord {
            path: path.to_string(),
            content_hash: format!("hash-{}", chunk_count),
            modified: 1000,
            chunk_count,
        }
    }

    #[test]
    fn test_create_and_reopen_persists() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("notes.sqlite");

        {
            let index = SqliteIndex::open(&db_path).unwrap();
            index.upsert(&batch_for("a.md", &[vec![1.0, 0.0]])).unwrap();
        }
        assert!(db_path.exists());

        let index = SqliteIndex::open(&db_path).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.dimension().unwrap(), Some(2));
        let entry = index.get("a.md_chunk_0").unwrap().unwrap();
        assert_eq!(entry.text, "a.md text 0");
        assert_eq!(entry.metadata.source, "a.md");
        assert_eq!(entry.embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn test_upsert_replaces_existing_entry() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index.upsert(&batch_for("a.md", &[vec![1.0, 0.0]])).unwrap();

        let replacement = UpsertBatch::new(
            vec!["a.md_chunk_0".into()],
            vec!["new text".into()],
            vec![ChunkMetadata {
                source: "a.md".into(),
                chunk: 0,
                modified: 2000,
            }],
            vec![vec![0.0, 1.0]],
        )
        .unwrap();
        index.upsert(&replacement).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let entry = index.get("a.md_chunk_0").unwrap().unwrap();
        assert_eq!(entry.text, "new text");
        assert_eq!(entry.metadata.modified, 2000);
        assert_eq!(entry.embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_query_orders_nearest_first() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .upsert(&batch_for(
                "a.md",
                &[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0]],
            ))
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a.md_chunk_1");
        assert_eq!(hits[1].id, "a.md_chunk_2");
        assert!(hits[0].distance.abs() < 1e-5);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_query_returns_all_when_fewer_than_k() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index.upsert(&batch_for("a.md", &[vec![1.0, 0.0]])).unwrap();
        assert_eq!(index.query(&[1.0, 0.0], 5).unwrap().len(), 1);
        assert!(index.query(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_empty_collection() {
        let index = SqliteIndex::open_in_memory().unwrap();
        assert!(index.query(&[1.0, 0.0], 2).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejects_whole_batch() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index.upsert(&batch_for("a.md", &[vec![1.0, 0.0]])).unwrap();

        let mixed = batch_for("b.md", &[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        let err = index.upsert(&mixed).unwrap_err();
        assert!(matches!(err, VaultError::DimensionMismatch { expected: 2, actual: 3 }));
        // first item of the failed batch must not have been committed
        assert!(index.get("b.md_chunk_0").unwrap().is_none());
        assert_eq!(index.count().unwrap(), 1);

        let err = index.query(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, VaultError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_sync_document_removes_orphaned_chunks() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let three = batch_for("a.md", &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]);
        assert_eq!(index.sync_document(&record("a.md", 3), &three).unwrap(), 0);
        index
            .sync_document(&record("b.md", 1), &batch_for("b.md", &[vec![1.0, 0.0]]))
            .unwrap();

        let one = batch_for("a.md", &[vec![0.5, 0.5]]);
        let removed = index.sync_document(&record("a.md", 1), &one).unwrap();
        assert_eq!(removed, 2);
        assert!(index.get("a.md_chunk_1").unwrap().is_none());
        assert!(index.get("a.md_chunk_2").unwrap().is_none());
        assert!(index.get("a.md_chunk_0").unwrap().is_some());
        assert!(index.get("b.md_chunk_0").unwrap().is_some());

        let doc = index.document("a.md").unwrap().unwrap();
        assert_eq!(doc.chunk_count, 1);
        assert_eq!(index.document_count().unwrap(), 2);
    }

    #[test]
    fn test_sync_document_rejects_foreign_entries() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let err = index
            .sync_document(&record("a.md", 1), &batch_for("b.md", &[vec![1.0]]))
            .unwrap_err();
        assert!(matches!(err, VaultError::IndexWriteFailure(_)));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0, 1.0], &[f32::MAX, f32::MAX]), 2.0);
    }

    #[test]
    fn test_query_ranks_overflowing_vectors_last() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index
            .upsert(&batch_for(
                "a.md",
                &[vec![f32::MAX, f32::MAX], vec![1.0, 0.0], vec![f32::MAX, f32::MAX]],
            ))
            .unwrap();

        let hits = index.query(&[1.0, 1.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a.md_chunk_1", "a.md_chunk_0", "a.md_chunk_2"]);
        assert!(hits.iter().all(|h| !h.distance.is_nan()));
    }

    #[test]
    fn test_reads_do_not_wait_for_writer() {
        use std::sync::{mpsc, Arc};
        use std::time::Duration;

        let dir = tempdir().unwrap();
        let index = Arc::new(SqliteIndex::open(dir.path().join("notes.sqlite")).unwrap());
        index.upsert(&batch_for("a.md", &[vec![1.0, 0.0]])).unwrap();

        let writer = index.conn.lock().unwrap();
        let (tx, rx) = mpsc::channel();
        let reader = index.clone();
        let handle = std::thread::spawn(move || {
            let hits = reader.query(&[1.0, 0.0], 1).map(|hits| hits.len());
            let count = reader.count();
            let _ = tx.send((hits, count));
        });

        let result = rx.recv_timeout(Duration::from_secs(5));
        drop(writer);
        handle.join().unwrap();

        let (hits, count) = result.expect("read blocked behind the writer lock");
        assert_eq!(hits.unwrap(), 1);
        assert_eq!(count.unwrap(), 1);
    }
}
