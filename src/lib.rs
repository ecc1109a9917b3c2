//! archiveforge - batch derivation of archival masters and sharing proxies
//!
//! This library crate exposes the binary's configuration loading and file
//! discovery for integration testing.

pub mod config;
pub mod discover;
