//! Unified error type for archiveforge.
//!
//! The first four variants are the failure taxonomy of a derivation run. All
//! of them are contained at the level of a single task; only [`Error::Catalog`]
//! and [`Error::Validation`] are allowed to stop a run before it starts.

use std::path::PathBuf;

/// Unified error type covering all failure modes in archiveforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry's source file is absent. Informational, never fatal.
    #[error("Source missing: {}", path.display())]
    SourceMissing {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// The external tool exited with a non-zero status.
    #[error("Tool error [{tool}]: exited with {}: {tail}", exit_label(code))]
    InvocationFailed {
        /// Name of the tool that failed.
        tool: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Bounded tail of the diagnostic stream.
        tail: String,
    },

    /// The tool reported success but the output is missing or empty.
    #[error("Anomalous output {}: {reason}", path.display())]
    OutputAnomalous {
        /// The output path that failed verification.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Any other failure during orchestration of a single entry.
    #[error("Unexpected fault: {0}")]
    UnexpectedFault(String),

    /// The catalog could not be read. Fatal at startup.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external tool could not be run (not found, spawn failure, timeout).
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether re-running the same catalog can resolve this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SourceMissing { .. }
                | Error::InvocationFailed { .. }
                | Error::OutputAnomalous { .. }
        )
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::OutputAnomalous`].
    pub fn anomalous(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::OutputAnomalous {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
