//! # af-av
//!
//! External tool plumbing for the archiveforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, honoring configured overrides.
//! - **Command execution** ([`ToolCommand`]) -- async builder with a timeout
//!   that kills the child process when it fires.
//! - **Tag probing** ([`probe`]) -- query a single container-level tag.
//! - **Staged replacement** ([`Workspace`]) -- write next to a file, then
//!   rename over it once the result is verified.

pub mod command;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use tools::{ToolInfo, ToolRegistry};
pub use workspace::Workspace;
