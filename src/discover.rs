//! Finding derivatives eligible for stamping.

use af_av::workspace::is_staging_file;
use af_core::Config;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Media files under `root` that live inside a master or proxy directory
/// and carry a derivative extension. Staging leftovers are ignored. The
/// result is sorted so runs are reproducible.
pub fn stamp_candidates(root: &Path, config: &Config) -> Vec<PathBuf> {
    let master = &config.derive.master;
    let proxy = &config.derive.proxy;
    let directories = [master.directory.as_str(), proxy.directory.as_str()];
    let extensions = [master.extension.as_str(), proxy.extension.as_str()];

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, &extensions))
        .filter(|p| in_output_directory(p, &directories))
        .filter(|p| !is_staging_file(p))
        .collect();

    found.sort();
    tracing::debug!("Found {} stamp candidates under {:?}", found.len(), root);
    found
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn in_output_directory(path: &Path, directories: &[&str]) -> bool {
    path.parent().is_some_and(|parent| {
        parent
            .components()
            .any(|c| directories.iter().any(|d| c.as_os_str() == *d))
    })
}
