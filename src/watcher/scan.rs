// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault scanning: which files count as notes, and the one-shot initial pass.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::document::is_note;
use crate::ingest::{IngestOutcome, IngestionPipeline};

/// Lists and filters the notes under a vault root.
///
/// Hidden files and folders (`.obsidian`, `.trash`, `.git`) are skipped, as
/// is anything matched by `.gitignore` or by a configured exclude fragment.
#[derive(Debug, Clone)]
pub struct VaultScanner {
    root: PathBuf,
    excludes: Vec<String>,
}

impl VaultScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            excludes: Vec::new(),
        }
    }

    pub fn with_excludes(mut self, excludes: &[String]) -> Self {
        self.excludes = excludes
            .iter()
            .map(|e| e.trim_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All notes currently in the vault, sorted by path.
    pub fn list_notes(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.into_path())
            .filter(|path| self.accepts(path))
            .collect();
        files.sort();
        files
    }

    /// Whether a path reported by the filesystem should be ingested.
    pub fn accepts(&self, path: &Path) -> bool {
        if !is_note(path) {
            return false;
        }
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            let Component::Normal(part) = component else {
                return false;
            };
            let part = part.to_string_lossy();
            if part.starts_with('.') {
                return false;
            }
            parts.push(part.into_owned());
        }
        let relative = parts.join("/");

        !self.excludes.iter().any(|fragment| {
            relative == *fragment
                || relative.starts_with(&format!("{}/", fragment))
                || relative.contains(&format!("/{}/", fragment))
        })
    }
}

/// Counts from one pass over the vault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub found: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ScanSummary {
    pub(crate) fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Indexed { .. } => self.indexed += 1,
            IngestOutcome::Unchanged { .. } => self.unchanged += 1,
            IngestOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Runs `files` through the pipeline on at most `workers` threads.
///
/// Per-file failures are counted, never propagated.
pub fn initial_scan(
    pipeline: &IngestionPipeline,
    files: &[PathBuf],
    workers: usize,
    progress: &ProgressBar,
) -> Result<ScanSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("vault-scan-{}", i))
        .build()
        .context("Failed to build scan thread pool")?;

    progress.set_length(files.len() as u64);
    let outcomes: Vec<IngestOutcome> = pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                progress.set_message(path.display().to_string());
                let outcome = pipeline.process(path);
                progress.inc(1);
                outcome
            })
            .collect()
    });
    progress.finish_and_clear();

    let mut summary = ScanSummary {
        found: files.len(),
        ..ScanSummary::default()
    };
    for outcome in &outcomes {
        summary.record(outcome);
    }
    Ok(summary)
}
