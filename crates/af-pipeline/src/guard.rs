//! Idempotency checks.
//!
//! A re-run over the same catalog must only complete what is missing. The
//! guard answers that question without running anything: an output that
//! exists is never redone, and a file that already carries the expected tag
//! is never restamped. Correctness of an existing output is not checked here;
//! failed runs remove their own partial outputs, so existence is enough.

use std::path::Path;

use serde::Serialize;

/// Whether a unit of work should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Skip,
    Proceed,
}

impl Decision {
    pub fn should_skip(self) -> bool {
        self == Decision::Skip
    }
}

/// Skip when the planned output is already on disk.
pub fn check_output(output: &Path) -> Decision {
    // `exists` follows symlinks; a dangling link counts as missing.
    if output.exists() {
        Decision::Skip
    } else {
        Decision::Proceed
    }
}

/// Skip when the existing tag value already contains the expected value.
///
/// An empty expectation never skips, so a blank configuration cannot mask
/// unstamped files.
pub fn check_tag(existing: &str, expected: &str) -> Decision {
    if !expected.is_empty() && existing.contains(expected) {
        Decision::Skip
    } else {
        Decision::Proceed
    }
}
