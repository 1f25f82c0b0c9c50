// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! `FastEmbedder` is the default, backed by a fastembed model that is loaded
//! lazily on first use and then reused for every call. `CommandProvider`
//! shells out to an external embedder, and `HashingProvider` is a
//! deterministic offline fallback.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{Result, VaultError};

/// Dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    /// Builds a config for the named model, then applies `FASTEMBED_*` env overrides.
    pub fn for_model(name: Option<&str>, batch_size: Option<usize>) -> Result<Self> {
        let mut config = Self {
            model: parse_model(name.unwrap_or(DEFAULT_FASTEMBED_MODEL))?,
            batch_size: batch_size.unwrap_or(DEFAULT_FASTEMBED_BATCH_SIZE),
            ..Self::default()
        };

        config.batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", config.batch_size)?;
        if config.batch_size == 0 {
            config.batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if config.batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                batch_size = config.batch_size,
                max = MAX_FASTEMBED_BATCH_SIZE,
                "fastembed batch size too large; clamping"
            );
            config.batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        config.max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", config.max_chars)?;
        if config.max_chars == 0 {
            config.max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        config.normalize = parse_bool_env("FASTEMBED_NORMALIZE", config.normalize)?;
        Ok(config)
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Text to vector capability.
///
/// Implementations are shared across threads; every vector a provider returns
/// has the same dimension for its whole lifetime.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Generates one embedding per input text, in order.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_many(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| VaultError::EmbeddingUnavailable("no embedding returned".into()))
    }
}

/// fastembed provider. The model is constructed on the first embed call and
/// kept for the life of the provider.
pub struct FastEmbedder {
    model: OnceCell<Mutex<TextEmbedding>>,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Self {
        let model_id = config.model.to_string();
        Self {
            model: OnceCell::new(),
            config,
            model_id,
        }
    }

    fn model(&self) -> Result<&Mutex<TextEmbedding>> {
        self.model.get_or_try_init(|| {
            info!(model = %self.model_id, "loading embedding model");
            TextEmbedding::try_new(InitOptions::new(self.config.model.clone()))
                .map(Mutex::new)
                .map_err(|e| VaultError::EmbeddingUnavailable(e.to_string()))
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = {
            let mut model = self
                .model()?
                .lock()
                .map_err(|_| VaultError::EmbeddingUnavailable("model lock poisoned".into()))?;
            model
                .embed(&prepared, Some(self.config.batch_size))
                .map_err(|e| VaultError::EmbeddingUnavailable(e.to_string()))?
        };

        if embeddings.len() != texts.len() {
            return Err(VaultError::EmbeddingUnavailable(format!(
                "model returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors, or an object holding one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let unavailable = |msg: String| VaultError::EmbeddingUnavailable(msg);

        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn `{}`: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .map_err(|e| unavailable(format!("failed to write payload: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| unavailable(format!("failed to read command output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(format!(
                "command failed (status {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())
            .map_err(|e| unavailable(format!("command output is not JSON: {}", e)))?;
        parse_vectors(parsed).map_err(unavailable)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self.run_command(batch)?;
            if embedded.len() != batch.len() {
                return Err(VaultError::EmbeddingUnavailable(format!(
                    "command returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        debug!(count = vectors.len(), command = %self.command, "embedded via command");
        Ok(vectors)
    }
}

fn parse_vectors(parsed: Value) -> std::result::Result<Vec<Vec<f32>>, String> {
    let rows = match parsed {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.remove(*key))
        {
            Some(Value::Array(arr)) => arr,
            Some(_) => return Err("embeddings field must be an array".into()),
            None => return Err("output missing 'embeddings' field".into()),
        },
        _ => return Err("output must be a JSON array or object".into()),
    };

    rows.iter()
        .map(|row| -> std::result::Result<Vec<f32>, String> {
            row.as_array()
                .ok_or_else(|| "embedding row must be an array".to_string())?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|v| v as f32)
                        .ok_or_else(|| "embedding value must be a number".to_string())
                })
                .collect()
        })
        .collect()
}

/// Deterministic bag-of-words provider using signed feature hashing.
///
/// Needs no model download; texts sharing words land close together under
/// cosine distance.
pub struct HashingProvider {
    model: String,
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hashing-{}", dimension),
            dimension,
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let mut slot = [0u8; 8];
            slot.copy_from_slice(&bytes[..8]);
            let idx = (u64::from_le_bytes(slot) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn parse_model(raw: &str) -> Result<EmbeddingModel> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
            Ok(EmbeddingModel::BGESmallENV15)
        }
        other => Err(VaultError::Config(format!(
            "unsupported embedding model '{}'; supported: minilm, bge-small",
            other
        ))),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .map_err(|_| VaultError::Config(format!("invalid {} value: {}", name, value)))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(VaultError::Config(format!("failed to read {}: {}", name, err))),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(VaultError::Config(format!("invalid {} value: {}", name, other))),
        },
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(VaultError::Config(format!("failed to read {}: {}", name, err))),
    }
}
