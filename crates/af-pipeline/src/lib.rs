//! # af-pipeline
//!
//! Derivative generation for catalogued video assets.
//!
//! This crate provides:
//!
//! - **Classification** ([`classify`]) -- named codec and scan categories
//!   with a conservative fallback.
//! - **[`Planner`]** -- pure decision logic: which derivatives an entry
//!   gets and with which argument vector.
//! - **Idempotency guard** ([`guard`]) -- existence and tag checks that turn
//!   a re-run into "complete what is missing".
//! - **[`ProcessInvoker`]** -- runs one command through a [`CommandRunner`],
//!   verifies the output, and removes anything malformed.
//! - **[`ErrorSink`]** -- serialized failure log shared by all workers.
//! - **[`Orchestrator`]** -- bounded worker pool over catalog entries.
//! - **[`Stamper`]** -- in-place provenance stamping of existing outputs.

pub mod classify;
pub mod guard;
pub mod invoker;
pub mod orchestrator;
pub mod plan;
pub mod sink;
pub mod stamp;

// Re-export key types at the crate root.
pub use guard::Decision;
pub use invoker::{CommandRunner, ProcessInvoker, ProcessOutcome, ToolRunner};
pub use orchestrator::{Orchestrator, RunSummary};
pub use plan::{CommandSpec, DerivativeKind, DerivativeTask, Planner, Strategy};
pub use sink::ErrorSink;
pub use stamp::Stamper;
