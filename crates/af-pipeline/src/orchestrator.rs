//! Bounded worker pool over catalog entries.
//!
//! Entries are admitted in catalog order, one permit each, and finish in
//! whatever order their tool invocations complete. Inside an entry the master
//! always finishes (either way) before the proxy starts. A failure, or even a
//! panic, in one entry is recorded and counted; it never stops the pool.
//!
//! Two catalog rows can name the same output (`tape.avi` and `tape.mov` both
//! derive `tape_Master.mov`). Each output path is claimed by the first entry
//! that reaches it during a run; later claimants skip it without invoking.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use af_core::{CatalogEntry, Config, Mode};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::guard;
use crate::invoker::{CommandRunner, ProcessInvoker};
use crate::plan::Planner;
use crate::sink::ErrorSink;

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Units of work submitted (catalog entries or stamp candidates).
    pub entries: usize,
    /// Entries whose source file was absent.
    pub missing_sources: usize,
    /// Tasks skipped because their result was already present.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Whether any task failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.entries += other.entries;
        self.missing_sources += other.missing_sources;
        self.skipped += other.skipped;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries: {} succeeded, {} failed, {} skipped, {} missing source",
            self.entries, self.succeeded, self.failed, self.skipped, self.missing_sources
        )
    }
}

/// Run `work` over `items` with at most `workers` in flight.
///
/// Permits are taken before spawning, so admission follows the order of
/// `items`. A task that panics is recorded in `sink` under `describe(item)`
/// and counted as one failure.
pub(crate) async fn run_bounded<T, D, F, Fut>(
    items: Vec<T>,
    workers: usize,
    sink: &ErrorSink,
    describe: D,
    work: F,
) -> RunSummary
where
    T: Send + 'static,
    D: Fn(&T) -> String,
    F: Fn(T) -> Fut,
    Fut: Future<Output = RunSummary> + Send + 'static,
{
    let mut summary = RunSummary {
        entries: items.len(),
        ..RunSummary::default()
    };
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let label = describe(&item);
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            // The semaphore is never closed.
            break;
        };
        let fut = work(item);
        handles.push((
            label,
            tokio::spawn(async move {
                let _permit = permit;
                fut.await
            }),
        ));
    }

    for (label, handle) in handles {
        match handle.await {
            Ok(tally) => summary.merge(tally),
            Err(e) => {
                let fault = af_core::Error::UnexpectedFault(e.to_string());
                sink.record(format!("[ERROR] {label}: {fault}"));
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Output paths taken during one run, mapped to the source that took them.
#[derive(Clone, Default)]
struct Claims(Arc<Mutex<HashMap<PathBuf, PathBuf>>>);

impl Claims {
    /// Take `output` for `source`, or return the source that already holds it.
    fn claim(&self, output: &Path, source: &Path) -> Result<(), PathBuf> {
        let mut claims = self.0.lock();
        match claims.get(output) {
            Some(owner) if owner != source => Err(owner.clone()),
            Some(_) => Ok(()),
            None => {
                claims.insert(output.to_path_buf(), source.to_path_buf());
                Ok(())
            }
        }
    }
}

/// Everything one worker needs to process an entry.
#[derive(Clone)]
struct Worker {
    planner: Arc<Planner>,
    invoker: ProcessInvoker,
    mode: Mode,
    claims: Claims,
}

impl Worker {
    async fn process(self, entry: CatalogEntry) -> RunSummary {
        let mut tally = RunSummary::default();
        let source = entry.source_path();

        if !source.is_file() {
            tracing::info!("[SKIP] {}", af_core::Error::SourceMissing { path: source });
            tally.missing_sources += 1;
            return tally;
        }

        for task in self.planner.plan(&entry, self.mode) {
            let label = task.kind.label();
            let output = &task.output_path;

            if let Err(owner) = self.claims.claim(output, &source) {
                tracing::warn!(
                    "[SKIP] {label} collides with {}: {}",
                    owner.display(),
                    output.display()
                );
                tally.skipped += 1;
                continue;
            }

            if guard::check_output(output).should_skip() {
                tracing::info!("[SKIP] {label} exists: {}", output.display());
                tally.skipped += 1;
                continue;
            }

            if let Some(parent) = output.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    self.invoker.sink().record(format!(
                        "[ERROR] {label} failed for {}: cannot create {}: {e}",
                        source.display(),
                        parent.display()
                    ));
                    tally.failed += 1;
                    continue;
                }
            }

            tracing::info!("[START] {label} ({:?}): {}", task.strategy, entry.filename());
            if self.invoker.run(&task.command, label).await {
                tracing::info!("[DONE] {label}: {}", output.display());
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }

        tally
    }
}

/// Drives derivative generation for a whole catalog.
pub struct Orchestrator {
    worker: Worker,
    workers: usize,
}

impl Orchestrator {
    /// Build an orchestrator from an immutable configuration.
    pub fn new(
        config: &Config,
        ffmpeg: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<ErrorSink>,
    ) -> Self {
        Self {
            worker: Worker {
                planner: Arc::new(Planner::new(config, ffmpeg)),
                invoker: ProcessInvoker::new(runner, sink),
                mode: config.derive.mode,
                claims: Claims::default(),
            },
            workers: config.derive.workers(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.worker.mode
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every entry and return the aggregate counts.
    pub async fn run(&self, entries: Vec<CatalogEntry>) -> RunSummary {
        tracing::info!(
            "Deriving {} entries ({}, {} workers)",
            entries.len(),
            self.worker.mode,
            self.workers
        );
        let worker = Worker {
            claims: Claims::default(),
            ..self.worker.clone()
        };
        let summary = run_bounded(
            entries,
            self.workers,
            self.worker.invoker.sink(),
            |entry| entry.source_path().display().to_string(),
            move |entry| worker.clone().process(entry),
        )
        .await;
        tracing::info!("Run complete: {summary}");
        summary
    }
}
