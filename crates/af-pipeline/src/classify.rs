//! Codec and scan classification.
//!
//! Every policy decision the planner makes about a source is derived from
//! these two classifications. Anything unrecognized lands in `Unknown`, which
//! maps to the conservative choice: transcode rather than copy, and treat the
//! scan as progressive only when nothing says otherwise.

use serde::Serialize;

/// Codec families that are already archival intermediates.
const MEZZANINE_MARKERS: &[&str] = &["prores"];

/// Codec families whose sources are field-based.
const INTERLACED_CODEC_MARKERS: &[&str] = &["dvvideo", "mpeg2video"];

/// ffprobe field orders that denote interlaced material, matched as substrings.
const FIELD_ORDER_MARKERS: &[&str] = &["tt", "bb", "tb", "bt"];

/// What the source codec implies for derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecClass {
    /// Already a mezzanine codec; masters can be stream-copied.
    Mezzanine,
    /// A codec family that is interlaced in practice.
    InterlacedSource,
    /// Anything else, including an empty codec string.
    Unknown,
}

/// What the recorded field order implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanClass {
    Progressive,
    Interlaced,
    Unknown,
}

/// Classify a lowercase codec name.
pub fn classify_codec(codec: &str) -> CodecClass {
    if MEZZANINE_MARKERS.iter().any(|m| codec.contains(m)) {
        CodecClass::Mezzanine
    } else if INTERLACED_CODEC_MARKERS.iter().any(|m| codec.contains(m)) {
        CodecClass::InterlacedSource
    } else {
        CodecClass::Unknown
    }
}

/// Classify a lowercase field order.
pub fn classify_scan(field_order: &str) -> ScanClass {
    let field_order = field_order.trim();
    let marked = FIELD_ORDER_MARKERS.iter().any(|m| field_order.contains(m));
    if marked || field_order.contains("interlaced") {
        ScanClass::Interlaced
    } else if field_order == "progressive" {
        ScanClass::Progressive
    } else {
        ScanClass::Unknown
    }
}

/// Whether the proxy needs a deinterlacing filter.
pub fn needs_deinterlace(codec: CodecClass, scan: ScanClass) -> bool {
    codec == CodecClass::InterlacedSource || scan == ScanClass::Interlaced
}
