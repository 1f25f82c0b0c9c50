// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-path debouncing of filesystem events.
//!
//! Editors often emit several writes per save. A path becomes ready once no
//! new event for it has arrived for the debounce interval.

use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Kind of change that queued an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

/// Work item handed from the watcher loop to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Extracts create/modify changes from a raw notify event.
///
/// Folder creation, metadata-only updates, access and removal events are
/// dropped. A rename counts as a modification of its destination when that
/// destination is a file.
pub fn changes(event: &Event) -> Vec<(ChangeKind, PathBuf)> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| (ChangeKind::Created, p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .last()
            .filter(|p| p.is_file())
            .map(|p| vec![(ChangeKind::Modified, p.clone())])
            .unwrap_or_default(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| (ChangeKind::Modified, p.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Pending changes keyed by path.
#[derive(Debug)]
pub struct PendingChanges {
    debounce: Duration,
    pending: HashMap<PathBuf, (ChangeKind, Instant)>,
}

impl PendingChanges {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: HashMap::new(),
        }
    }

    /// Records a change at `now`, restarting that path's quiet period.
    /// A path first seen as created stays `Created` until it is flushed.
    pub fn record(&mut self, kind: ChangeKind, path: PathBuf, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|(existing, seen)| {
                if *existing != ChangeKind::Created {
                    *existing = kind;
                }
                *seen = now;
            })
            .or_insert((kind, now));
    }

    /// Earliest instant at which some pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|(_, seen)| *seen + self.debounce)
            .min()
    }

    /// Removes and returns every path that has been quiet for the debounce
    /// interval, sorted by path.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<IngestJob> {
        let debounce = self.debounce;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();

        let mut jobs: Vec<IngestJob> = ready
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(kind, _)| IngestJob { kind, path })
            })
            .collect();
        jobs.sort_by(|a, b| a.path.cmp(&b.path));
        jobs
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
