//! Process invocation and output verification.
//!
//! [`ProcessInvoker::invoke`] runs one [`CommandSpec`] and records what
//! happened; [`verify`] decides whether that counts as success and removes
//! any artifact a failed run left behind. Nothing in here returns an error to
//! the worker pool: every failure becomes exactly one [`ErrorSink`] record and
//! a `false`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use af_av::{ToolCommand, ToolOutput};
use async_trait::async_trait;
use serde::Serialize;

use crate::plan::CommandSpec;
use crate::sink::ErrorSink;

/// Characters of the diagnostic stream kept for triage.
pub const DIAGNOSTIC_TAIL_CHARS: usize = 600;

/// Seam between the pipeline and real processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// A non-zero exit is a normal `Ok` result; `Err` is reserved for the
    /// process not running at all (missing binary, timeout).
    async fn run(&self, program: &Path, args: &[String]) -> af_core::Result<ToolOutput>;
}

/// Runs commands as child processes through [`ToolCommand`].
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ToolRunner {
    async fn run(&self, program: &Path, args: &[String]) -> af_core::Result<ToolOutput> {
        ToolCommand::new(program.to_path_buf())
            .args(args.iter().cloned())
            .timeout(self.timeout)
            .execute()
            .await
    }
}

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was killed or never ran.
    pub exit_code: Option<i32>,
    /// Bounded tail of stderr.
    pub diagnostic_tail: String,
    pub output_exists: bool,
    pub output_size: u64,
    /// The output was already on disk before the invocation started.
    pub preexisting: bool,
    /// Set when the process could not be run at all.
    pub fault: Option<String>,
}

/// Last `max_chars` characters of `stream`, trailing whitespace removed.
pub fn diagnostic_tail(stream: &str, max_chars: usize) -> String {
    let trimmed = stream.trim_end();
    let total = trimmed.chars().count();
    if total <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(total - max_chars).collect()
    }
}

/// Apply the verification rules to `outcome`, deleting a bad artifact.
///
/// In order: a fault or non-zero exit fails and removes any output; a zero
/// exit without output fails; a zero-byte output fails and is removed.
/// Outputs that predate the invocation are never removed.
///
/// # Errors
///
/// [`af_core::Error::UnexpectedFault`], [`af_core::Error::InvocationFailed`]
/// or [`af_core::Error::OutputAnomalous`] describing the failure.
pub fn verify(outcome: &ProcessOutcome, output: &Path, tool: &str) -> af_core::Result<()> {
    if let Some(fault) = &outcome.fault {
        remove_artifact(outcome, output);
        return Err(af_core::Error::UnexpectedFault(fault.clone()));
    }

    if outcome.exit_code != Some(0) {
        remove_artifact(outcome, output);
        return Err(af_core::Error::InvocationFailed {
            tool: tool.to_string(),
            code: outcome.exit_code,
            tail: outcome.diagnostic_tail.clone(),
        });
    }

    if !outcome.output_exists {
        return Err(af_core::Error::anomalous(
            output,
            "missing output despite successful exit",
        ));
    }

    if outcome.output_size == 0 {
        remove_artifact(outcome, output);
        return Err(af_core::Error::anomalous(output, "zero-byte output"));
    }

    Ok(())
}

fn remove_artifact(outcome: &ProcessOutcome, output: &Path) {
    if outcome.preexisting || !output.exists() {
        return;
    }
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!("Removed failed output {}", output.display()),
        Err(e) => tracing::warn!("Failed to remove {}: {e}", output.display()),
    }
}

/// Runs commands and turns their outcomes into success or a logged failure.
#[derive(Clone)]
pub struct ProcessInvoker {
    runner: Arc<dyn CommandRunner>,
    sink: Arc<ErrorSink>,
}

impl ProcessInvoker {
    pub fn new(runner: Arc<dyn CommandRunner>, sink: Arc<ErrorSink>) -> Self {
        Self { runner, sink }
    }

    pub fn sink(&self) -> &Arc<ErrorSink> {
        &self.sink
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Run `spec` and capture exit, diagnostics and output state.
    pub async fn invoke(&self, spec: &CommandSpec) -> ProcessOutcome {
        let preexisting = spec.destination.exists();
        let args = spec.to_args();
        tracing::debug!("{} args: {:?}", spec.tool_name(), args);

        let (exit_code, diagnostic_tail, fault) = match self.runner.run(&spec.tool, &args).await {
            Ok(out) => (
                out.exit_code,
                diagnostic_tail(&out.stderr, DIAGNOSTIC_TAIL_CHARS),
                None,
            ),
            Err(e) => (None, String::new(), Some(e.to_string())),
        };

        let (output_exists, output_size) = match std::fs::metadata(&spec.destination) {
            Ok(meta) => (true, meta.len()),
            Err(_) => (false, 0),
        };

        ProcessOutcome {
            exit_code,
            diagnostic_tail,
            output_exists,
            output_size,
            preexisting,
            fault,
        }
    }

    /// Invoke, verify, and log a failure under `label`. Returns whether the
    /// output is good.
    pub async fn run(&self, spec: &CommandSpec, label: &str) -> bool {
        let outcome = self.invoke(spec).await;
        match verify(&outcome, &spec.destination, &spec.tool_name()) {
            Ok(()) => true,
            Err(e) => {
                self.sink.record(format!(
                    "[ERROR] {label} failed for {}: {e}",
                    spec.source.display()
                ));
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, FakeRunner};
    use super::*;
    use std::path::PathBuf;

    fn spec(dir: &Path) -> CommandSpec {
        CommandSpec {
            tool: PathBuf::from("/usr/bin/ffmpeg"),
            codec_args: vec!["-c".into(), "copy".into()],
            source: dir.join("tape01.avi"),
            destination: dir.join("tape01_Master.mov"),
            metadata: vec![],
        }
    }

    fn invoker(runner: Arc<FakeRunner>) -> (ProcessInvoker, Arc<ErrorSink>) {
        let sink = Arc::new(ErrorSink::discard());
        (ProcessInvoker::new(runner, Arc::clone(&sink)), sink)
    }

    fn outcome(exit_code: Option<i32>, exists: bool, size: u64) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            diagnostic_tail: String::new(),
            output_exists: exists,
            output_size: size,
            preexisting: false,
            fault: None,
        }
    }

    #[test]
    fn tail_keeps_last_chars() {
        let long = format!("{}END", "a".repeat(1000));
        let tail = diagnostic_tail(&long, DIAGNOSTIC_TAIL_CHARS);
        assert_eq!(tail.chars().count(), 600);
        assert!(tail.ends_with("END"));
        assert_eq!(diagnostic_tail("short\n\n", 600), "short");
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let s = "é".repeat(700);
        assert_eq!(diagnostic_tail(&s, 600), "é".repeat(600));
    }

    #[test]
    fn verify_rule_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.mov");

        assert!(verify(&outcome(Some(0), true, 10), &out, "ffmpeg").is_ok());
        assert!(matches!(
            verify(&outcome(Some(1), true, 10), &out, "ffmpeg"),
            Err(af_core::Error::InvocationFailed { code: Some(1), .. })
        ));
        assert!(matches!(
            verify(&outcome(Some(0), false, 0), &out, "ffmpeg"),
            Err(af_core::Error::OutputAnomalous { .. })
        ));
        assert!(matches!(
            verify(&outcome(Some(0), true, 0), &out, "ffmpeg"),
            Err(af_core::Error::OutputAnomalous { .. })
        ));
        assert!(matches!(
            verify(&outcome(None, false, 0), &out, "ffmpeg"),
            Err(af_core::Error::InvocationFailed { code: None, .. })
        ));
    }

    #[test]
    fn verify_never_removes_preexisting_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("x.mov");
        std::fs::write(&out, b"good master").unwrap();

        let mut o = outcome(Some(1), true, 11);
        o.preexisting = true;
        assert!(verify(&o, &out, "ffmpeg").is_err());
        assert!(out.exists());
    }

    #[tokio::test]
    async fn success_keeps_output_and_logs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (inv, sink) = invoker(FakeRunner::new(Behavior::Succeed));
        let spec = spec(dir.path());

        assert!(inv.run(&spec, "Master").await);
        assert!(spec.destination.exists());
        assert_eq!(sink.records(), 0);
    }

    #[tokio::test]
    async fn failure_removes_output_and_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (inv, sink) = invoker(FakeRunner::new(Behavior::FailWithPartial));
        let spec = spec(dir.path());

        let outcome = inv.invoke(&spec).await;
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.output_exists);
        assert!(outcome.diagnostic_tail.contains("Error while decoding"));
        std::fs::remove_file(&spec.destination).unwrap();

        assert!(!inv.run(&spec, "Master").await);
        assert!(!spec.destination.exists());
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn zero_byte_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (inv, sink) = invoker(FakeRunner::new(Behavior::SucceedEmpty));
        let spec = spec(dir.path());

        assert!(!inv.run(&spec, "Proxy").await);
        assert!(!spec.destination.exists());
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn missing_output_despite_success_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (inv, sink) = invoker(FakeRunner::new(Behavior::SucceedWithoutOutput));

        assert!(!inv.run(&spec(dir.path()), "Proxy").await);
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn missing_tool_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let (inv, sink) = invoker(FakeRunner::new(Behavior::Missing));
        let spec = spec(dir.path());

        let outcome = inv.invoke(&spec).await;
        assert!(outcome.fault.is_some());
        assert!(!inv.run(&spec, "Master").await);
        assert_eq!(sink.records(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tool_runner_runs_real_processes() {
        let runner = ToolRunner::new(Some(Duration::from_secs(10)));
        let out = runner
            .run(Path::new("sh"), &["-c".to_string(), "echo err >&2; exit 2".to_string()])
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(2));
        assert_eq!(out.stderr.trim(), "err");
    }
}
