//! Catalog entry model and delimited-file loader.
//!
//! A catalog is a CSV (or TSV) file with named columns. Only four columns
//! matter to derivation; everything else a cataloguing pass may have recorded
//! (sizes, durations, resolutions) is ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

pub const COLUMN_DIRECTORY: &str = "Directory Path";
pub const COLUMN_FILENAME: &str = "Filename";
pub const COLUMN_VIDEO_CODEC: &str = "Video Codec";
pub const COLUMN_FIELD_ORDER: &str = "Field Order";

/// One source asset from the catalog.
///
/// Codec and field order are stored lowercased and trimmed, so every
/// comparison downstream can be a plain substring or equality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    directory: PathBuf,
    filename: String,
    video_codec: String,
    field_order: String,
}

impl CatalogEntry {
    pub fn new(
        directory: impl Into<PathBuf>,
        filename: impl Into<String>,
        video_codec: &str,
        field_order: &str,
    ) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            video_codec: normalize(video_codec),
            field_order: normalize(field_order),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn video_codec(&self) -> &str {
        &self.video_codec
    }

    pub fn field_order(&self) -> &str {
        &self.field_order
    }

    /// Full path of the source file.
    pub fn source_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Filename without its final extension (`tape.01.avi` -> `tape.01`).
    pub fn base_name(&self) -> &str {
        match self.filename.rfind('.') {
            Some(idx) if idx > 0 => &self.filename[..idx],
            _ => &self.filename,
        }
    }
}

fn normalize(value: &str) -> String {
    let value = value.trim();
    // Spreadsheet exports write missing cells as "nan".
    if value.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        value.to_lowercase()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Directory Path")]
    directory: String,
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Video Codec", default)]
    video_codec: String,
    #[serde(rename = "Field Order", default)]
    field_order: String,
}

/// Load every row of a catalog file.
///
/// # Errors
///
/// Returns [`Error::Catalog`] if the file cannot be opened, lacks one of the
/// required columns, or contains a row without a directory or filename. No
/// partial catalog is ever returned.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| Error::Catalog(format!("cannot open {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::Catalog(format!("cannot read header of {}: {e}", path.display())))?
        .clone();
    for column in [
        COLUMN_DIRECTORY,
        COLUMN_FILENAME,
        COLUMN_VIDEO_CODEC,
        COLUMN_FIELD_ORDER,
    ] {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::Catalog(format!(
                "{} has no '{column}' column",
                path.display()
            )));
        }
    }

    let mut entries = Vec::new();
    for (i, row) in reader.deserialize::<CatalogRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.map_err(|e| Error::Catalog(format!("{}:{line}: {e}", path.display())))?;
        if row.directory.trim().is_empty() || row.filename.trim().is_empty() {
            return Err(Error::Catalog(format!(
                "{}:{line}: empty directory or filename",
                path.display()
            )));
        }
        entries.push(CatalogEntry::new(
            row.directory.trim(),
            row.filename.trim(),
            &row.video_codec,
            &row.field_order,
        ));
    }

    tracing::debug!("Loaded {} catalog entries from {}", entries.len(), path.display());
    Ok(entries)
}
