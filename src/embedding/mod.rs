// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns passages and queries into vectors.
//!
//! The provider is built once by the composition root and shared by the
//! ingestion pipeline and the retrieval service.

pub mod provider;

pub use provider::{
    CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder, HashingProvider,
    DEFAULT_EMBEDDING_DIM,
};
