// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-time retrieval: embed the question, fetch the nearest passages and
//! bundle them as context for the completion service.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::errors::{Result, VaultError};
use crate::index::{QueryHit, VectorIndex};

/// Passages returned per query when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 2;

/// Separator placed between passages in the assembled context.
pub const CONTEXT_DELIMITER: &str = "\n---\n";

/// Ordered matches for one query, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub hits: Vec<QueryHit>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// True when there is nothing usable: no hits, or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.hits.iter().all(|hit| hit.text.trim().is_empty())
    }
}

/// Context handed to the completion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBundle {
    pub query: String,
    pub result: QueryResult,
}

impl ContextBundle {
    /// Retrieved passages joined by [`CONTEXT_DELIMITER`].
    pub fn context(&self) -> String {
        self.result
            .hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER)
    }
}

/// Outcome of a retrieval. `NoRelevantContent` is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Context(ContextBundle),
    NoRelevantContent,
}

pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Returns the `k` nearest passages for `query`.
    pub fn search(&self, query: &str, k: usize) -> Result<QueryResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(VaultError::EmptyQuery);
        }

        let embedding = self.embedder.embed(query)?;
        let hits = self.index.query(&embedding, k)?;
        debug!(query, k, hits = hits.len(), "retrieved passages");
        Ok(QueryResult { hits })
    }

    /// Like [`search`](Self::search), but folds empty or blank results into
    /// [`Retrieval::NoRelevantContent`].
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval> {
        let result = self.search(query, k)?;
        if result.is_blank() {
            return Ok(Retrieval::NoRelevantContent);
        }
        Ok(Retrieval::Context(ContextBundle {
            query: query.trim().to_string(),
            result,
        }))
    }
}
