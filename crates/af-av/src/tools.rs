//! Locating ffmpeg and ffprobe.
//!
//! The [`ToolRegistry`] resolves the locations of the transcoding tool
//! (ffmpeg) and the probing tool (ffprobe) once at startup. Workers only ever
//! see resolved paths.

use std::path::{Path, PathBuf};

use serde::Serialize;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// One line of the `check-tools` report.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved locations of the two tools the pipeline drives.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl ToolRegistry {
    /// Resolve ffmpeg and ffprobe.
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// searches `PATH`. A tool that cannot be found stays unresolved until
    /// something [`require`](Self::require)s it.
    pub fn discover(tools_config: &af_core::config::ToolsConfig) -> Self {
        Self {
            ffmpeg: resolve(FFMPEG, tools_config.ffmpeg_path.as_deref()),
            ffprobe: resolve(FFPROBE, tools_config.ffprobe_path.as_deref()),
        }
    }

    /// Build a registry from explicit paths, bypassing discovery.
    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: Some(ffmpeg.into()),
            ffprobe: Some(ffprobe.into()),
        }
    }

    fn slot(&self, name: &str) -> Option<&PathBuf> {
        match name {
            FFMPEG => self.ffmpeg.as_ref(),
            FFPROBE => self.ffprobe.as_ref(),
            _ => None,
        }
    }

    /// Path of `name`, or [`af_core::Error::Tool`] if it was not found.
    pub fn require(&self, name: &str) -> af_core::Result<&Path> {
        self.slot(name).map(PathBuf::as_path).ok_or_else(|| {
            af_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Availability and version of each tool, ffmpeg first.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        [FFMPEG, FFPROBE]
            .into_iter()
            .map(|name| {
                let path = self.slot(name).cloned();
                ToolInfo {
                    name: name.to_string(),
                    available: path.is_some(),
                    version: path.as_deref().and_then(detect_version),
                    path,
                }
            })
            .collect()
    }
}

fn resolve(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    let resolved = match configured {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!(
                "Configured {name} path {} does not exist; searching PATH",
                p.display()
            );
            which::which(name).ok()
        }
        None => which::which(name).ok(),
    };
    match &resolved {
        Some(path) => tracing::debug!("Resolved {name} to {}", path.display()),
        None => tracing::debug!("{name} not found"),
    }
    resolved
}

/// First line of `<tool> -version`, e.g. `ffmpeg version 6.1.1 Copyright ...`.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(str::trim).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::config::ToolsConfig;

    #[test]
    fn existing_override_wins() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let cfg = ToolsConfig {
            ffmpeg_path: Some(tmp.path().to_path_buf()),
            ffprobe_path: None,
        };
        let registry = ToolRegistry::discover(&cfg);
        assert_eq!(registry.require(FFMPEG).unwrap(), tmp.path());
    }

    #[test]
    fn missing_override_falls_back_to_path_search() {
        let cfg = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg")),
            ffprobe_path: None,
        };
        let registry = ToolRegistry::discover(&cfg);
        if let Ok(path) = registry.require(FFMPEG) {
            assert_ne!(path, Path::new("/nonexistent/ffmpeg"));
        }
    }

    #[test]
    fn unresolved_tool_names_itself() {
        let err = ToolRegistry::default().require(FFPROBE).unwrap_err();
        assert!(matches!(&err, af_core::Error::Tool { tool, .. } if tool == "ffprobe"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn explicit_paths_skip_discovery() {
        let registry = ToolRegistry::with_paths("/opt/ff/ffmpeg", "/opt/ff/ffprobe");
        assert_eq!(registry.require(FFMPEG).unwrap(), Path::new("/opt/ff/ffmpeg"));
        assert_eq!(registry.require(FFPROBE).unwrap(), Path::new("/opt/ff/ffprobe"));
    }

    #[test]
    fn report_lists_both_tools_in_order() {
        let report = ToolRegistry::default().check_all();
        let names: Vec<&str> = report.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, [FFMPEG, FFPROBE]);
        assert!(report.iter().all(|i| !i.available && i.path.is_none()));

        let json = serde_json::to_value(&report[0]).unwrap();
        assert_eq!(json["available"], false);
    }
}
