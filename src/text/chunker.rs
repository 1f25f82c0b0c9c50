// SPDX-License-Identifier: MIT OR Apache-2.0

//! Character-window chunker for note passages.
//!
//! Splits normalized text into windows of at most `chunk_size` characters.
//! Every window after the first starts exactly `chunk_overlap` characters
//! before the end of the previous one, so consecutive chunks share that many
//! characters and together cover the whole input.
//!
//! Window ends are pulled back to a natural break when one is available:
//! ```text
//! hard_end = min(start + chunk_size, len)
//! end      = last "\n\n" | last "\n" | last whitespace in the window, else hard_end
//! start'   = end - chunk_overlap
//! ```
//! The same input and configuration always produce the same boundaries, which
//! is what keeps ordinal-based chunk ids stable across re-ingestion.
//!
//! Spans cover the raw windows; chunk text is the window with surrounding
//! whitespace trimmed. Windows that are only whitespace are dropped and
//! ordinals stay contiguous.

use crate::errors::{Result, VaultError};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(VaultError::Config("chunk_size must be greater than 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(VaultError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// A passage of a document with its character span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position within the document.
    pub ordinal: usize,
    /// Start offset of the window in characters (inclusive).
    pub start: usize,
    /// End offset of the window in characters (exclusive).
    pub end: usize,
    /// Window text without leading or trailing whitespace. Never empty.
    pub text: String,
}

/// Splits text into overlapping passages.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Splits `text` into chunks. Empty or whitespace-only input yields no
    /// chunks; other input shorter than `chunk_size` yields exactly one.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        byte_offsets.push(text.len());

        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0_usize;

        loop {
            let hard_end = (start + size).min(total);
            let end = if hard_end == total {
                total
            } else {
                // end > start + overlap keeps the next window moving forward
                break_point(&chars, start + overlap + 1, start + size / 2, hard_end)
            };

            let window = text[byte_offsets[start]..byte_offsets[end]].trim();
            if !window.is_empty() {
                chunks.push(TextChunk {
                    ordinal: chunks.len(),
                    start,
                    end,
                    text: window.to_string(),
                });
            }

            if end == total {
                break;
            }
            start = end - overlap;
        }

        chunks
    }
}

/// Picks the window end. Paragraph and line breaks are only taken from the
/// back half of the window (`preferred_floor`), plain whitespace from anywhere
/// past `min_end`.
fn break_point(chars: &[char], min_end: usize, preferred_floor: usize, hard_end: usize) -> usize {
    let floor = min_end.max(preferred_floor);

    let paragraph = (floor.max(2)..=hard_end)
        .rev()
        .find(|&end| chars[end - 1] == '\n' && chars[end - 2] == '\n');
    if let Some(end) = paragraph {
        return end;
    }

    let line = (floor..=hard_end).rev().find(|&end| chars[end - 1] == '\n');
    if let Some(end) = line {
        return end;
    }

    (min_end..=hard_end)
        .rev()
        .find(|&end| chars[end - 1].is_whitespace())
        .unwrap_or(hard_end)
}
