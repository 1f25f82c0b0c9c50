// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text preparation: note markup cleanup and passage chunking.

pub mod chunker;
pub mod normalize;

pub use chunker::{ChunkConfig, Chunker, TextChunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use normalize::normalize;
