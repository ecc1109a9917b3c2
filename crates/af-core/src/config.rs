//! Run configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries every
//! setting a derivation or stamping run needs. Every section defaults sensibly
//! so a completely empty file is valid. A `Config` is built once at startup
//! and handed to the orchestrator by value; nothing here is mutated afterwards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub derive: DeriveConfig,
    pub metadata: MetadataConfig,
    pub tools: ToolsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.metadata.copyright.trim().is_empty() {
            warnings.push("metadata.copyright is empty; outputs will carry no copyright tag".into());
        }
        if self.metadata.artist.trim().is_empty() {
            warnings.push("metadata.artist is empty".into());
        }
        if self.derive.tool_timeout_secs == 0 {
            warnings.push(
                "derive.tool_timeout_secs is 0; a hung transcode will hold its worker forever"
                    .into(),
            );
        }
        if self.derive.proxy.crf > 51 {
            warnings.push(format!(
                "derive.proxy.crf {} is outside the x264 range 0-51",
                self.derive.proxy.crf
            ));
        }

        warnings
    }

    /// Reject configurations that cannot produce a correct run.
    pub fn check(&self) -> Result<()> {
        let master = &self.derive.master;
        let proxy = &self.derive.proxy;

        if master.extension.trim().is_empty() || proxy.extension.trim().is_empty() {
            return Err(Error::Validation(
                "master and proxy extensions must not be empty".into(),
            ));
        }
        if master.directory == proxy.directory {
            return Err(Error::Validation(format!(
                "master and proxy outputs share the directory name '{}'",
                master.directory
            )));
        }
        if master.directory.contains(['/', '\\']) || proxy.directory.contains(['/', '\\']) {
            return Err(Error::Validation(
                "output directory names must be a single path component".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Which derivatives a run produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    MastersOnly,
    ProxiesOnly,
    #[default]
    Both,
}

impl Mode {
    /// Whether the archival master is produced in this mode.
    pub fn includes_master(self) -> bool {
        matches!(self, Mode::MastersOnly | Mode::Both)
    }

    /// Whether the sharing proxy is produced in this mode.
    pub fn includes_proxy(self) -> bool {
        matches!(self, Mode::ProxiesOnly | Mode::Both)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::MastersOnly => "masters-only",
            Mode::ProxiesOnly => "proxies-only",
            Mode::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "masters-only" | "masters" | "master" => Ok(Mode::MastersOnly),
            "proxies-only" | "proxies" | "proxy" => Ok(Mode::ProxiesOnly),
            "both" => Ok(Mode::Both),
            other => Err(format!(
                "unknown mode '{other}' (expected masters-only, proxies-only or both)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    pub mode: Mode,

    /// Number of entries processed at once. `0` means one per CPU.
    pub concurrency: usize,

    /// Upper bound on a single tool invocation. `0` disables the limit.
    pub tool_timeout_secs: u64,

    pub master: MasterProfile,

    pub proxy: ProxyProfile,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Both,
            concurrency: 4,
            tool_timeout_secs: 6 * 60 * 60,
            master: MasterProfile::default(),
            proxy: ProxyProfile::default(),
        }
    }
}

impl DeriveConfig {
    /// Effective worker count, resolving `0` to the number of CPUs.
    pub fn workers(&self) -> usize {
        if self.concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            self.concurrency
        }
    }

    /// Effective tool timeout, `None` when disabled.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

/// Encoding profile for archival masters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterProfile {
    /// Output subdirectory next to the source.
    pub directory: String,
    pub suffix: String,
    pub extension: String,
    pub video_codec: String,
    pub codec_profile: String,
    pub vendor: String,
    pub bits_per_mb: u32,
    pub pixel_format: String,
    pub audio_codec: String,
    pub sample_rate: u32,
}

impl Default for MasterProfile {
    fn default() -> Self {
        Self {
            directory: "Masters".into(),
            suffix: "_Master".into(),
            extension: "mov".into(),
            video_codec: "prores_ks".into(),
            codec_profile: "2".into(), // ProRes 422
            vendor: "apl0".into(),
            bits_per_mb: 8000,
            pixel_format: "yuv422p10le".into(),
            audio_codec: "pcm_s16le".into(),
            sample_rate: 48_000,
        }
    }
}

/// Encoding profile for sharing proxies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyProfile {
    pub directory: String,
    pub suffix: String,
    pub extension: String,
    pub video_codec: String,
    pub crf: u32,
    pub preset: String,
    pub pixel_format: String,
    pub deinterlace_filter: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    /// Relocate the moov atom for progressive download.
    pub faststart: bool,
}

impl Default for ProxyProfile {
    fn default() -> Self {
        Self {
            directory: "Proxies".into(),
            suffix: "_Share".into(),
            extension: "mp4".into(),
            video_codec: "libx264".into(),
            crf: 23,
            preset: "slow".into(),
            pixel_format: "yuv420p".into(),
            deinterlace_filter: "yadif".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            sample_rate: 48_000,
            faststart: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata, tools, log
// ---------------------------------------------------------------------------

/// Provenance tags written into every output container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub copyright: String,
    pub artist: String,
    pub comment: String,
}

impl MetadataConfig {
    /// Non-empty `(key, value)` pairs in a stable order.
    pub fn fields(&self) -> Vec<(String, String)> {
        [
            ("copyright", &self.copyright),
            ("artist", &self.artist),
            ("comment", &self.comment),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// Optional overrides for external tool locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Failure log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append-only log of failed tasks.
    pub error_log: PathBuf,
    /// Echo every failure record to stderr as well.
    pub console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            error_log: PathBuf::from("archiveforge-errors.log"),
            console: true,
        }
    }
}
