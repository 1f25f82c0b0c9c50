// SPDX-License-Identifier: MIT OR Apache-2.0

//! vault-rag - Semantic index for a markdown notes vault
//!
//! Keeps a persistent vector collection in sync with the notes on disk and
//! retrieves the passages closest to a natural-language question.

pub mod app;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod errors;
pub mod index;
pub mod ingest;
pub mod output;
pub mod retrieval;
pub mod text;
pub mod watcher;
