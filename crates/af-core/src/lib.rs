//! af-core: shared error type, configuration, and the catalog entry model.
//!
//! This crate is the foundational dependency for the other af-* crates. It
//! knows nothing about processes or concurrency; it only describes what a
//! catalog row is and how a run is configured.

pub mod catalog;
pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use catalog::{load_catalog, CatalogEntry};
pub use config::{Config, Mode};
pub use error::{Error, Result};
