//! Staged in-place replacement of a media file.
//!
//! A [`Workspace`] names a staging file next to the target (same directory,
//! so the final rename never crosses a filesystem), and replaces the target
//! with it on [`finalize`](Workspace::finalize). An unfinalized workspace
//! removes its staging file when dropped.

use std::path::{Path, PathBuf};

/// Prefix given to staging files.
pub const STAGING_PREFIX: &str = "temp_";

/// Staging area for rewriting one file in place.
///
/// # Example
///
/// ```no_run
/// use af_av::Workspace;
///
/// let workspace = Workspace::beside(std::path::Path::new("/Masters/a_Master.mov")).unwrap();
/// // ... write the rewritten file to workspace.output() ...
/// workspace.finalize().unwrap();
/// ```
#[derive(Debug)]
pub struct Workspace {
    input_path: PathBuf,
    staging_path: PathBuf,
    finalized: bool,
}

impl Workspace {
    /// Create a workspace for rewriting `input`.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Validation`] if `input` has no file name.
    pub fn beside(input: &Path) -> af_core::Result<Self> {
        let file_name = input.file_name().ok_or_else(|| {
            af_core::Error::Validation(format!("no file name in {}", input.display()))
        })?;
        let mut staged = std::ffi::OsString::from(STAGING_PREFIX);
        staged.push(file_name);

        Ok(Self {
            input_path: input.to_path_buf(),
            staging_path: input.with_file_name(staged),
            finalized: false,
        })
    }

    /// The file being rewritten.
    pub fn input(&self) -> &Path {
        &self.input_path
    }

    /// Where the rewritten file should be written.
    pub fn output(&self) -> &Path {
        &self.staging_path
    }

    /// Replace the input with the staged output and return the final path.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged output does not exist or the rename
    /// fails.
    pub fn finalize(mut self) -> af_core::Result<PathBuf> {
        if !self.staging_path.exists() {
            return Err(af_core::Error::anomalous(
                &self.staging_path,
                "staged output does not exist",
            ));
        }
        std::fs::rename(&self.staging_path, &self.input_path)?;
        self.finalized = true;
        Ok(self.input_path.clone())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.finalized && self.staging_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.staging_path) {
                tracing::warn!(
                    "Failed to remove staging file {}: {e}",
                    self.staging_path.display()
                );
            }
        }
    }
}

/// Whether `path` looks like a leftover staging file.
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn staging_path_is_a_sibling() {
        let ws = Workspace::beside(Path::new("/archive/Masters/a_Master.mov")).unwrap();
        assert_eq!(ws.input(), Path::new("/archive/Masters/a_Master.mov"));
        assert_eq!(
            ws.output(),
            Path::new("/archive/Masters/temp_a_Master.mov")
        );
    }

    #[test]
    fn finalize_replaces_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"original").unwrap();

        let ws = Workspace::beside(&input).unwrap();
        fs::write(ws.output(), b"stamped").unwrap();

        let final_path = ws.finalize().unwrap();
        assert_eq!(final_path, input);
        assert_eq!(fs::read_to_string(&input).unwrap(), "stamped");
        assert!(!dir.path().join("temp_clip.mp4").exists());
    }

    #[test]
    fn finalize_fails_when_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"original").unwrap();

        let ws = Workspace::beside(&input).unwrap();
        assert!(ws.finalize().is_err());
        assert_eq!(fs::read_to_string(&input).unwrap(), "original");
    }

    #[test]
    fn drop_removes_unfinalized_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"original").unwrap();

        let staged = {
            let ws = Workspace::beside(&input).unwrap();
            fs::write(ws.output(), b"partial").unwrap();
            ws.output().to_path_buf()
        };
        assert!(!staged.exists());
        assert_eq!(fs::read_to_string(&input).unwrap(), "original");
    }

    #[test]
    fn detects_staging_files() {
        assert!(is_staging_file(Path::new("/a/temp_x.mov")));
        assert!(!is_staging_file(Path::new("/a/x.mov")));
    }
}
