// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the ingestion and retrieval paths.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Document could not be read or decoded. The file is skipped.
    #[error("failed to load {}: {reason}", path.display())]
    LoadFailure { path: PathBuf, reason: String },

    /// Model initialization or inference failed.
    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The vector store rejected a write.
    #[error("index write failed: {0}")]
    IndexWriteFailure(String),

    #[error("index read failed: {0}")]
    IndexReadFailure(String),

    #[error("embedding dimension mismatch: collection uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query must not be empty")]
    EmptyQuery,

    /// The external completion service failed.
    #[error("completion failed: {0}")]
    CompletionFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl VaultError {
    pub fn load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::LoadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Short category label used in log lines and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadFailure { .. } => "load_failure",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::IndexWriteFailure(_) | Self::DimensionMismatch { .. } => "index_write_failure",
            Self::IndexReadFailure(_) => "index_read_failure",
            Self::EmptyQuery => "empty_query",
            Self::CompletionFailure(_) => "completion_failure",
            Self::Config(_) => "config",
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::IndexWriteFailure(err.to_string())
    }
}
