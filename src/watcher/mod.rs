// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault watcher: initial scan, then incremental re-ingestion on file events.
//!
//! Notify callbacks only enqueue raw events. The watcher loop debounces them
//! per path and hands [`IngestJob`]s to a fixed pool of workers. Jobs are
//! sharded by path so saves to the same note are processed in order.

pub mod debounce;
pub mod scan;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub use debounce::{changes, ChangeKind, IngestJob, PendingChanges};
pub use scan::{initial_scan, ScanSummary, VaultScanner};

use crate::config::WatchConfig;
use crate::ingest::IngestionPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    InitialScan,
    Watching,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub debounce: Duration,
    pub workers: usize,
    pub drain_timeout: Duration,
    pub excludes: Vec<String>,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default(), &[])
    }
}

impl WatcherOptions {
    pub fn from_config(watch: &WatchConfig, excludes: &[String]) -> Self {
        Self {
            debounce: watch.debounce(),
            workers: watch.workers(),
            drain_timeout: watch.drain_timeout(),
            excludes: excludes.to_vec(),
        }
    }
}

/// Counts for one watcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub initial: ScanSummary,
    /// Jobs dispatched after the initial scan; `found` is the dispatch count.
    pub live: ScanSummary,
}

pub struct VaultWatcher {
    pipeline: Arc<IngestionPipeline>,
    scanner: VaultScanner,
    options: WatcherOptions,
    progress: ProgressBar,
    state: watch::Sender<WatcherState>,
}

impl VaultWatcher {
    pub fn new(pipeline: Arc<IngestionPipeline>, options: WatcherOptions) -> Self {
        let scanner = VaultScanner::new(pipeline.vault_root()).with_excludes(&options.excludes);
        let (state, _) = watch::channel(WatcherState::Idle);
        Self {
            pipeline,
            scanner,
            options,
            progress: ProgressBar::hidden(),
            state,
        }
    }

    /// Progress bar driven during the initial scan.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    fn set_state(&self, state: WatcherState) {
        debug!(?state, "watcher state");
        self.state.send_replace(state);
    }

    /// Scans the vault, then watches it until `shutdown` resolves.
    ///
    /// The subscription is opened before the scan so edits made while it runs
    /// are replayed afterwards. On shutdown, jobs already handed to workers get
    /// up to `drain_timeout` to finish.
    pub async fn run<F>(&self, shutdown: F) -> Result<WatchSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let root = self.scanner.root().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("Vault path is not a directory: {}", root.display());
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.send(res);
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        self.set_state(WatcherState::InitialScan);
        let files = self.scanner.list_notes();
        info!(root = %root.display(), files = files.len(), "initial scan started");

        let scan = {
            let pipeline = self.pipeline.clone();
            let workers = self.options.workers;
            let progress = self.progress.clone();
            tokio::task::spawn_blocking(move || initial_scan(&pipeline, &files, workers, &progress))
        };

        let mut summary = WatchSummary::default();
        tokio::select! {
            joined = scan => {
                summary.initial = joined.context("Initial scan task failed")??;
            }
            _ = &mut shutdown => {
                info!("shutdown requested during initial scan");
                self.set_state(WatcherState::Stopped);
                return Ok(summary);
            }
        }
        info!(
            found = summary.initial.found,
            indexed = summary.initial.indexed,
            unchanged = summary.initial.unchanged,
            failed = summary.initial.failed,
            "initial scan complete"
        );

        self.set_state(WatcherState::Watching);
        let mut pool = WorkerPool::start(self.pipeline.clone(), self.options.workers);
        let mut pending = PendingChanges::new(self.options.debounce);

        loop {
            let deadline = pending.next_deadline().map(tokio::time::Instant::from_std);
            tokio::select! {
                _ = &mut shutdown => break,
                received = event_rx.recv() => match received {
                    Some(Ok(event)) => {
                        for (kind, path) in changes(&event) {
                            if self.scanner.accepts(&path) {
                                pending.record(kind, path, Instant::now());
                            }
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "watch error"),
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    for job in pending.drain_ready(Instant::now()) {
                        debug!(path = %job.path.display(), kind = ?job.kind, "dispatching");
                        pool.dispatch(job);
                    }
                }
            }
        }

        self.set_state(WatcherState::Stopped);
        drop(watcher);
        if !pending.is_empty() {
            debug!(pending = pending.len(), "discarding undebounced changes");
        }
        summary.live = pool.drain(self.options.drain_timeout).await;
        info!(
            dispatched = summary.live.found,
            indexed = summary.live.indexed,
            failed = summary.live.failed,
            "watcher stopped"
        );
        Ok(summary)
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Fixed set of workers, each draining its own queue sequentially.
struct WorkerPool {
    queues: Vec<mpsc::UnboundedSender<IngestJob>>,
    workers: JoinSet<ScanSummary>,
    dispatched: usize,
}

impl WorkerPool {
    fn start(pipeline: Arc<IngestionPipeline>, size: usize) -> Self {
        let mut queues = Vec::new();
        let mut workers = JoinSet::new();
        for _ in 0..size.max(1) {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.push(tx);
            workers.spawn(worker(pipeline.clone(), rx));
        }
        Self {
            queues,
            workers,
            dispatched: 0,
        }
    }

    fn dispatch(&mut self, job: IngestJob) {
        let mut hasher = DefaultHasher::new();
        job.path.hash(&mut hasher);
        let shard = (hasher.finish() % self.queues.len() as u64) as usize;
        if self.queues[shard].send(job).is_ok() {
            self.dispatched += 1;
        }
    }

    /// Closes the queues and waits up to `timeout` for queued jobs to finish.
    async fn drain(mut self, timeout: Duration) -> ScanSummary {
        self.queues.clear();
        let mut summary = ScanSummary {
            found: self.dispatched,
            ..ScanSummary::default()
        };

        let workers = &mut self.workers;
        let collect = async {
            let mut totals = ScanSummary::default();
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(done) => {
                        totals.indexed += done.indexed;
                        totals.unchanged += done.unchanged;
                        totals.failed += done.failed;
                    }
                    Err(e) => warn!(error = %e, "ingestion worker failed"),
                }
            }
            totals
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(totals) => {
                summary.indexed = totals.indexed;
                summary.unchanged = totals.unchanged;
                summary.failed = totals.failed;
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "abandoning in-flight ingestion");
                self.workers.abort_all();
            }
        }
        summary
    }
}

async fn worker(
    pipeline: Arc<IngestionPipeline>,
    mut jobs: mpsc::UnboundedReceiver<IngestJob>,
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    while let Some(job) = jobs.recv().await {
        let pipeline = pipeline.clone();
        match tokio::task::spawn_blocking(move || pipeline.process(&job.path)).await {
            Ok(outcome) => summary.record(&outcome),
            Err(e) => {
                warn!(error = %e, "ingestion task panicked");
                summary.failed += 1;
            }
        }
        summary.found += 1;
    }
    summary
}
