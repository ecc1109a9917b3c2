//! Derivative planning.
//!
//! Planning is pure: the same entry under the same configuration always yields
//! the same tasks with the same argument vectors, and nothing touches the
//! filesystem beyond joining paths.

use std::path::{Path, PathBuf};

use af_core::config::{MasterProfile, MetadataConfig, ProxyProfile};
use af_core::{CatalogEntry, Config, Mode};
use serde::Serialize;

use crate::classify::{classify_codec, classify_scan, needs_deinterlace, CodecClass};

/// Which derivative a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DerivativeKind {
    /// High-fidelity archival copy.
    Master,
    /// Compressed sharing copy.
    Proxy,
}

impl DerivativeKind {
    pub fn label(self) -> &'static str {
        match self {
            DerivativeKind::Master => "Master",
            DerivativeKind::Proxy => "Proxy",
        }
    }
}

/// How the derivative is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    /// Remux without re-encoding.
    StreamCopy,
    /// Decode and re-encode.
    Transcode,
}

/// One invocation of the transcoding tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub tool: PathBuf,
    /// Codec, filter and stream-mapping arguments.
    pub codec_args: Vec<String>,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub metadata: Vec<(String, String)>,
}

impl CommandSpec {
    /// Full argument vector.
    ///
    /// Always starts with `-n` so the tool refuses to overwrite, and always
    /// carries over the source container metadata before applying the
    /// provenance tags.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            "-i".to_string(),
            self.source.to_string_lossy().to_string(),
        ];
        args.extend(self.codec_args.iter().cloned());
        args.extend(["-map_metadata".to_string(), "0".to_string()]);
        for (key, value) in &self.metadata {
            args.push("-metadata".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.destination.to_string_lossy().to_string());
        args
    }

    /// Short tool name for log lines.
    pub fn tool_name(&self) -> String {
        self.tool
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.tool.to_string_lossy().to_string())
    }
}

/// A planned derivative for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeTask {
    pub kind: DerivativeKind,
    pub strategy: Strategy,
    pub output_path: PathBuf,
    /// Video filter chain in application order. Empty for masters.
    pub filters: Vec<String>,
    pub command: CommandSpec,
}

/// Turns catalog entries into derivative tasks.
#[derive(Debug, Clone)]
pub struct Planner {
    master: MasterProfile,
    proxy: ProxyProfile,
    metadata: MetadataConfig,
    tool: PathBuf,
}

impl Planner {
    pub fn new(config: &Config, tool: impl Into<PathBuf>) -> Self {
        Self {
            master: config.derive.master.clone(),
            proxy: config.derive.proxy.clone(),
            metadata: config.metadata.clone(),
            tool: tool.into(),
        }
    }

    /// Plan the derivatives for `entry` under `mode`. The master, when
    /// enabled, always comes first.
    pub fn plan(&self, entry: &CatalogEntry, mode: Mode) -> Vec<DerivativeTask> {
        let mut tasks = Vec::with_capacity(2);
        if mode.includes_master() {
            tasks.push(self.plan_master(entry));
        }
        if mode.includes_proxy() {
            tasks.push(self.plan_proxy(entry));
        }
        tasks
    }

    /// `<dir>/<subdir>/<base><suffix>.<ext>`
    fn output_path(entry: &CatalogEntry, subdir: &str, suffix: &str, ext: &str) -> PathBuf {
        entry
            .directory()
            .join(subdir)
            .join(format!("{}{suffix}.{ext}", entry.base_name()))
    }

    fn command(&self, entry: &CatalogEntry, codec_args: Vec<String>, dest: &Path) -> CommandSpec {
        CommandSpec {
            tool: self.tool.clone(),
            codec_args,
            source: entry.source_path(),
            destination: dest.to_path_buf(),
            metadata: self.metadata.fields(),
        }
    }

    fn plan_master(&self, entry: &CatalogEntry) -> DerivativeTask {
        let p = &self.master;
        let output_path = Self::output_path(entry, &p.directory, &p.suffix, &p.extension);

        let (strategy, codec_args) = match classify_codec(entry.video_codec()) {
            CodecClass::Mezzanine => (Strategy::StreamCopy, strs(&["-c", "copy", "-map", "0"])),
            CodecClass::InterlacedSource | CodecClass::Unknown => (
                Strategy::Transcode,
                vec![
                    "-c:v".into(),
                    p.video_codec.clone(),
                    "-profile:v".into(),
                    p.codec_profile.clone(),
                    "-vendor".into(),
                    p.vendor.clone(),
                    "-bits_per_mb".into(),
                    p.bits_per_mb.to_string(),
                    "-pix_fmt".into(),
                    p.pixel_format.clone(),
                    "-c:a".into(),
                    p.audio_codec.clone(),
                    "-ar".into(),
                    p.sample_rate.to_string(),
                    "-map".into(),
                    "0".into(),
                ],
            ),
        };

        DerivativeTask {
            kind: DerivativeKind::Master,
            strategy,
            command: self.command(entry, codec_args, &output_path),
            output_path,
            filters: Vec::new(),
        }
    }

    fn plan_proxy(&self, entry: &CatalogEntry) -> DerivativeTask {
        let p = &self.proxy;
        let output_path = Self::output_path(entry, &p.directory, &p.suffix, &p.extension);

        // Deinterlace on the raw fields, then convert the pixel format.
        let mut filters = Vec::with_capacity(2);
        let codec = classify_codec(entry.video_codec());
        let scan = classify_scan(entry.field_order());
        if needs_deinterlace(codec, scan) {
            filters.push(p.deinterlace_filter.clone());
        }
        filters.push(format!("format={}", p.pixel_format));

        let mut codec_args = vec![
            "-c:v".into(),
            p.video_codec.clone(),
            "-crf".into(),
            p.crf.to_string(),
            "-preset".into(),
            p.preset.clone(),
            "-vf".into(),
            filters.join(","),
            "-c:a".into(),
            p.audio_codec.clone(),
            "-b:a".into(),
            p.audio_bitrate.clone(),
            "-ar".into(),
            p.sample_rate.to_string(),
            // Data and subtitle streams can abort an mp4 mux.
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "0:a?".into(),
        ];
        if p.faststart {
            codec_args.extend(strs(&["-movflags", "+faststart"]));
        }

        DerivativeTask {
            kind: DerivativeKind::Proxy,
            strategy: Strategy::Transcode,
            command: self.command(entry, codec_args, &output_path),
            output_path,
            filters,
        }
    }
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> Planner {
        let mut config = Config::default();
        config.metadata = MetadataConfig {
            copyright: "Copyright Example Archive".into(),
            artist: "Example Project".into(),
            comment: "Preserved copy".into(),
        };
        Planner::new(&config, "/usr/bin/ffmpeg")
    }

    fn entry(codec: &str, field_order: &str) -> CatalogEntry {
        CatalogEntry::new("/archive/tapes", "tape01.avi", codec, field_order)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn mode_selects_tasks() {
        let p = planner();
        let e = entry("h264", "progressive");
        let kinds = |mode| -> Vec<DerivativeKind> {
            p.plan(&e, mode).into_iter().map(|t| t.kind).collect()
        };
        assert_eq!(kinds(Mode::Both), vec![DerivativeKind::Master, DerivativeKind::Proxy]);
        assert_eq!(kinds(Mode::MastersOnly), vec![DerivativeKind::Master]);
        assert_eq!(kinds(Mode::ProxiesOnly), vec![DerivativeKind::Proxy]);
    }

    #[test]
    fn output_paths_follow_layout() {
        let tasks = planner().plan(&entry("h264", ""), Mode::Both);
        assert_eq!(
            tasks[0].output_path,
            PathBuf::from("/archive/tapes/Masters/tape01_Master.mov")
        );
        assert_eq!(
            tasks[1].output_path,
            PathBuf::from("/archive/tapes/Proxies/tape01_Share.mp4")
        );
        assert_eq!(tasks[0].command.destination, tasks[0].output_path);
    }

    #[test]
    fn mezzanine_master_is_stream_copy() {
        let task = &planner().plan(&entry("prores", "progressive"), Mode::MastersOnly)[0];
        assert_eq!(task.strategy, Strategy::StreamCopy);
        let args = task.command.to_args();
        assert_eq!(value_after(&args, "-c"), Some("copy"));
        assert_eq!(value_after(&args, "-map"), Some("0"));
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn other_masters_transcode_to_prores_422() {
        for codec in ["dvvideo", "h264", "", "mpeg2video"] {
            let task = &planner().plan(&entry(codec, ""), Mode::MastersOnly)[0];
            assert_eq!(task.strategy, Strategy::Transcode, "{codec}");
            let args = task.command.to_args();
            assert_eq!(value_after(&args, "-c:v"), Some("prores_ks"));
            assert_eq!(value_after(&args, "-pix_fmt"), Some("yuv422p10le"));
            assert_eq!(value_after(&args, "-c:a"), Some("pcm_s16le"));
            assert_eq!(value_after(&args, "-ar"), Some("48000"));
        }
    }

    #[test]
    fn interlaced_proxy_deinterlaces_before_format() {
        for (codec, fo) in [("dvvideo", "progressive"), ("h264", "bb"), ("h264", "tt"), ("", "interlaced")] {
            let task = &planner().plan(&entry(codec, fo), Mode::ProxiesOnly)[0];
            assert_eq!(task.filters, vec!["yadif", "format=yuv420p"], "{codec}/{fo}");
            let args = task.command.to_args();
            assert_eq!(value_after(&args, "-vf"), Some("yadif,format=yuv420p"));
        }
    }

    #[test]
    fn progressive_proxy_has_no_deinterlace() {
        for (codec, fo) in [("h264", "progressive"), ("prores", "progressive"), ("", ""), ("hevc", "unknown")] {
            let task = &planner().plan(&entry(codec, fo), Mode::ProxiesOnly)[0];
            assert_eq!(task.filters, vec!["format=yuv420p"], "{codec}/{fo}");
        }
    }

    #[test]
    fn proxy_is_always_transcoded_with_explicit_maps() {
        let task = &planner().plan(&entry("prores", "progressive"), Mode::ProxiesOnly)[0];
        assert_eq!(task.strategy, Strategy::Transcode);
        let args = task.command.to_args();
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-crf"), Some("23"));
        assert_eq!(value_after(&args, "-b:a"), Some("192k"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        let maps: Vec<&str> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(maps, vec!["0:v", "0:a?"]);
    }

    #[test]
    fn every_command_is_no_overwrite_with_metadata() {
        for task in planner().plan(&entry("dvvideo", "bb"), Mode::Both) {
            let args = task.command.to_args();
            assert_eq!(args[0], "-n");
            assert_eq!(&args[1..3], ["-i", "/archive/tapes/tape01.avi"]);
            assert_eq!(value_after(&args, "-map_metadata"), Some("0"));
            assert!(args.contains(&"copyright=Copyright Example Archive".to_string()));
            assert!(args.contains(&"artist=Example Project".to_string()));
            assert!(args.contains(&"comment=Preserved copy".to_string()));
            assert_eq!(
                args.last().map(String::as_str),
                Some(task.output_path.to_str().unwrap())
            );
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let p = planner();
        let e = entry("mpeg2video", "tt");
        assert_eq!(p.plan(&e, Mode::Both), p.plan(&e, Mode::Both));
    }

    #[test]
    fn tool_name_is_file_name() {
        let task = &planner().plan(&entry("", ""), Mode::MastersOnly)[0];
        assert_eq!(task.command.tool_name(), "ffmpeg");
    }
}
