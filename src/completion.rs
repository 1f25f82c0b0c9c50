// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam to the external completion (LLM) service.
//!
//! This crate only assembles the request; turning it into prose is the
//! client's job. `NoRelevantContent` short-circuits before any client call.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};
use crate::retrieval::{ContextBundle, Retrieval, RetrievalService};

/// Reply used when retrieval finds nothing worth sending to the model.
pub const NO_MATCH_ANSWER: &str = "No matching content found in your notes.";

const INSTRUCTIONS: &str = "You are an assistant that answers questions using only the provided notes context.

Rules:
- Only use information from the context below
- If the context doesn't have enough information, say \"I don't have enough information in your notes to answer this\"
- Be helpful and conversational";

/// Body of an ask request: `{"query": "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// Body of an ask response: `{"answer": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
}

/// What the completion service receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub query: String,
}

impl CompletionRequest {
    pub fn from_bundle(bundle: &ContextBundle) -> Self {
        Self {
            system_prompt: format!(
                "{}\n\nContext from your notes:\n{}\n",
                INSTRUCTIONS,
                bundle.context()
            ),
            query: bundle.query.clone(),
        }
    }
}

/// External text-completion capability.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;
}

/// Retrieves context for `query` and passes it to `client`.
///
/// Returns [`NO_MATCH_ANSWER`] without calling the client when retrieval
/// comes back empty.
pub fn answer(
    retrieval: &RetrievalService,
    client: &dyn CompletionClient,
    query: &str,
    k: usize,
) -> Result<Answer> {
    let bundle = match retrieval.retrieve(query, k)? {
        Retrieval::NoRelevantContent => {
            return Ok(Answer {
                answer: NO_MATCH_ANSWER.to_string(),
            })
        }
        Retrieval::Context(bundle) => bundle,
    };

    let request = CompletionRequest::from_bundle(&bundle);
    let text = client
        .complete(&request)
        .map_err(|e| VaultError::CompletionFailure(e.to_string()))?;
    Ok(Answer { answer: text })
}

/// Handles a decoded ask body. A missing or blank `query` is `EmptyQuery`.
pub fn handle_ask(
    retrieval: &RetrievalService,
    client: &dyn CompletionClient,
    request: &AskRequest,
    k: usize,
) -> Result<Answer> {
    let query = request.query.as_deref().unwrap_or_default();
    answer(retrieval, client, query, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingProvider};
    use crate::index::{chunk_id, ChunkMetadata, SqliteIndex, UpsertBatch, VectorIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingClient {
        calls: AtomicUsize,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl CompletionClient for RecordingClient {
        fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            Ok("Battery life matters for drones.".into())
        }
    }

    struct FailingClient;

    impl CompletionClient for FailingClient {
        fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn service(texts: &[&str]) -> RetrievalService {
        let embedder = Arc::new(HashingProvider::new(64));
        let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
        if !texts.is_empty() {
            let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
            let embeddings = embedder.embed_many(&owned).unwrap();
            let ids = (0..texts.len()).map(|i| chunk_id("a.md", i)).collect();
            let metas = (0..texts.len())
                .map(|i| ChunkMetadata {
                    source: "a.md".into(),
                    chunk: i,
                    modified: 0,
                })
                .collect();
            index
                .upsert(&UpsertBatch::new(ids, owned, metas, embeddings).unwrap())
                .unwrap();
        }
        RetrievalService::new(embedder, index)
    }

    #[test]
    fn no_content_skips_client() {
        let client = RecordingClient::default();
        let reply = answer(&service(&[]), &client, "battery", 2).unwrap();
        assert_eq!(reply.answer, NO_MATCH_ANSWER);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prompt_contains_joined_context() {
        let client = RecordingClient::default();
        let svc = service(&["Drones carry payloads.", "Battery life matters."]);
        let reply = answer(&svc, &client, "battery life", 2).unwrap();
        assert_eq!(reply.answer, "Battery life matters for drones.");

        let request = client.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.query, "battery life");
        assert!(request.system_prompt.starts_with("You are an assistant"));
        assert!(request.system_prompt.contains("Context from your notes:\n"));
        assert!(request.system_prompt.contains("\n---\n"));
    }

    #[test]
    fn missing_query_is_empty_query() {
        let body: AskRequest = serde_json::from_str("{}").unwrap();
        let err = handle_ask(&service(&[]), &RecordingClient::default(), &body, 2).unwrap_err();
        assert!(matches!(err, VaultError::EmptyQuery));
    }

    #[test]
    fn client_failure_is_reported() {
        let svc = service(&["Battery life matters."]);
        let err = answer(&svc, &FailingClient, "battery", 2).unwrap_err();
        assert!(matches!(err, VaultError::CompletionFailure(_)));
    }

    #[test]
    fn answer_serializes_as_json_object() {
        let json = serde_json::to_string(&Answer {
            answer: "hi".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"answer":"hi"}"#);
    }
}
