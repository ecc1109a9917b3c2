//! Running ffmpeg and ffprobe as child processes.
//!
//! Both streams are captured in full. A timeout kills the child rather than
//! abandoning it, so a hung encode cannot hold a worker slot forever.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// What a finished process left behind.
///
/// A non-zero exit is not an error at this level; callers decide what a
/// failed exit means for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    /// ffmpeg writes its diagnostics here.
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One external tool invocation.
///
/// ```no_run
/// # async fn stamp_probe() -> af_core::Result<()> {
/// let tag = af_av::ToolCommand::new("ffprobe".into())
///     .args(["-v", "quiet", "-show_entries", "format_tags=copyright"])
///     .arg("/archive/Masters/tape01_Master.mov")
///     .timeout(Some(std::time::Duration::from_secs(30)))
///     .execute_checked()
///     .await?
///     .stdout;
/// # let _ = tag;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    /// Create a new command for the given program path. No timeout is set.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(value.into());
        self
    }

    pub fn args(&mut self, values: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        for value in values {
            self.args.push(value.into());
        }
        self
    }

    /// Set the maximum execution time. `None` waits indefinitely.
    pub fn timeout(&mut self, d: Option<Duration>) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run to completion and capture both streams.
    ///
    /// # Errors
    ///
    /// - Returns [`af_core::Error::Tool`] if spawning the process fails.
    /// - Returns [`af_core::Error::Tool`] if the process times out; the child
    ///   is killed before this returns.
    pub async fn execute(&self) -> af_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| af_core::Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        // Dropping the wait future on timeout drops the child, and
        // kill_on_drop terminates it.
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    return Err(af_core::Error::tool(
                        program_name,
                        format!("timed out after {limit:?}"),
                    ))
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| {
            af_core::Error::tool(&program_name, format!("I/O error waiting for process: {e}"))
        })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Execute the command and treat a non-zero exit as an error.
    ///
    /// # Errors
    ///
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`af_core::Error::Tool`] with stderr when the exit status is non-zero.
    pub async fn execute_checked(&self) -> af_core::Result<ToolOutput> {
        let output = self.execute().await?;
        if !output.success() {
            return Err(af_core::Error::tool(
                self.program_name(),
                format!(
                    "exited with status {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            ));
        }
        Ok(output)
    }
}
