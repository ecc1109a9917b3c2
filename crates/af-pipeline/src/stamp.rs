//! In-place provenance stamping of existing derivatives.
//!
//! A file that already carries the configured copyright is left alone.
//! Anything else is remuxed with the provenance tags into a staging file next
//! to it, verified with the same rules as a derivation, and only then renamed
//! over the original. The original is never touched when stamping fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use af_av::probe::{format_tag_args, parse_tag_value};
use af_av::Workspace;
use af_core::config::MetadataConfig;
use af_core::Config;

use crate::guard::check_tag;
use crate::invoker::{CommandRunner, ProcessInvoker};
use crate::orchestrator::{run_bounded, RunSummary};
use crate::plan::CommandSpec;
use crate::sink::ErrorSink;

/// Tag compared against the configured copyright to detect stamped files.
pub const STAMP_TAG: &str = "copyright";

/// Result of stamping one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampOutcome {
    AlreadyStamped,
    Stamped,
    Missing,
    Failed,
}

impl StampOutcome {
    fn tally(self) -> RunSummary {
        let mut t = RunSummary::default();
        match self {
            StampOutcome::AlreadyStamped => t.skipped = 1,
            StampOutcome::Stamped => t.succeeded = 1,
            StampOutcome::Missing => t.missing_sources = 1,
            StampOutcome::Failed => t.failed = 1,
        }
        t
    }
}

/// Stamps provenance tags onto existing media files.
#[derive(Clone)]
pub struct Stamper {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    metadata: MetadataConfig,
    invoker: ProcessInvoker,
    workers: usize,
}

impl Stamper {
    pub fn new(
        config: &Config,
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<ErrorSink>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            metadata: config.metadata.clone(),
            invoker: ProcessInvoker::new(runner, sink),
            workers: config.derive.workers(),
        }
    }

    /// Remux `file` into `staging` with every stream copied and the
    /// provenance tags applied.
    pub fn stamp_command(&self, file: &Path, staging: &Path) -> CommandSpec {
        CommandSpec {
            tool: self.ffmpeg.clone(),
            codec_args: ["-c", "copy", "-map", "0"].iter().map(|s| s.to_string()).collect(),
            source: file.to_path_buf(),
            destination: staging.to_path_buf(),
            metadata: self.metadata.fields(),
        }
    }

    /// Current value of the stamp tag. A probe that cannot run or fails
    /// reads as untagged.
    async fn current_tag(&self, file: &Path) -> String {
        let args = format_tag_args(STAMP_TAG, file);
        match self.invoker.runner().run(&self.ffprobe, &args).await {
            Ok(out) if out.success() => parse_tag_value(&out.stdout),
            Ok(out) => {
                tracing::debug!("Probe of {} exited with {:?}", file.display(), out.exit_code);
                String::new()
            }
            Err(e) => {
                tracing::debug!("Probe of {} failed: {e}", file.display());
                String::new()
            }
        }
    }

    /// Stamp one file.
    pub async fn stamp_file(&self, file: &Path) -> StampOutcome {
        if !file.is_file() {
            tracing::info!("[SKIP] {}", af_core::Error::SourceMissing { path: file.to_path_buf() });
            return StampOutcome::Missing;
        }

        let current = self.current_tag(file).await;
        if check_tag(&current, &self.metadata.copyright).should_skip() {
            tracing::info!("[OK] already stamped: {}", file.display());
            return StampOutcome::AlreadyStamped;
        }

        let workspace = match Workspace::beside(file) {
            Ok(ws) => ws,
            Err(e) => {
                self.invoker
                    .sink()
                    .record(format!("[ERROR] Stamp failed for {}: {e}", file.display()));
                return StampOutcome::Failed;
            }
        };

        // A staging file left by an interrupted run would make `-n` refuse.
        if workspace.output().exists() {
            tracing::warn!("Removing stale staging file {}", workspace.output().display());
            if let Err(e) = std::fs::remove_file(workspace.output()) {
                self.invoker.sink().record(format!(
                    "[ERROR] Stamp failed for {}: cannot remove {}: {e}",
                    file.display(),
                    workspace.output().display()
                ));
                return StampOutcome::Failed;
            }
        }

        let spec = self.stamp_command(file, workspace.output());
        if !self.invoker.run(&spec, "Stamp").await {
            return StampOutcome::Failed;
        }

        match workspace.finalize() {
            Ok(path) => {
                tracing::info!("[DONE] Stamped {}", path.display());
                StampOutcome::Stamped
            }
            Err(e) => {
                self.invoker
                    .sink()
                    .record(format!("[ERROR] Stamp failed for {}: {e}", file.display()));
                StampOutcome::Failed
            }
        }
    }

    /// Stamp every file across the bounded worker pool.
    pub async fn run(&self, files: Vec<PathBuf>) -> RunSummary {
        if self.metadata.fields().is_empty() {
            tracing::warn!("No metadata configured; nothing to stamp");
            return RunSummary {
                entries: files.len(),
                skipped: files.len(),
                ..RunSummary::default()
            };
        }

        tracing::info!("Stamping {} files ({} workers)", files.len(), self.workers);
        let stamper = self.clone();
        let summary = run_bounded(
            files,
            self.workers,
            self.invoker.sink(),
            |file| file.display().to_string(),
            move |file| {
                let stamper = stamper.clone();
                async move { stamper.stamp_file(&file).await.tally() }
            },
        )
        .await;
        tracing::info!("Stamping complete: {summary}");
        summary
    }
}
