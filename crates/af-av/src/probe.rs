//! Container tag probing through ffprobe.
//!
//! Only a single format-level tag is ever queried, printed as a bare value so
//! no JSON parsing is involved. A file without the tag yields an empty string.

use std::path::Path;

/// Arguments that make ffprobe print the value of one format tag and nothing
/// else.
pub fn format_tag_args(tag: &str, file: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-show_entries".to_string(),
        format!("format_tags={tag}"),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        file.to_string_lossy().to_string(),
    ]
}

/// Normalize ffprobe's plain output into the tag value.
pub fn parse_tag_value(stdout: &str) -> String {
    stdout.trim().to_string()
}
