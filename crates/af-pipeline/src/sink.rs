//! Serialized failure log.
//!
//! Every worker reports failures through one [`ErrorSink`]. A record is
//! formatted up front and then written to the log file and echoed to stderr
//! while holding a single lock, so records from different workers never
//! interleave. Records appear in arrival order, not catalog order.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

struct SinkState {
    file: Option<File>,
    records: usize,
}

/// Append-only, mutex-guarded failure log.
pub struct ErrorSink {
    path: Option<PathBuf>,
    console: bool,
    state: Mutex<SinkState>,
}

impl ErrorSink {
    /// Open (or create) the log at `path` in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`af_core::Error::Io`] if the file or its parent directory
    /// cannot be created.
    pub fn open(path: &Path, console: bool) -> af_core::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            console,
            state: Mutex::new(SinkState {
                file: Some(file),
                records: 0,
            }),
        })
    }

    /// A sink that only echoes to stderr.
    pub fn console_only() -> Self {
        Self {
            path: None,
            console: true,
            state: Mutex::new(SinkState {
                file: None,
                records: 0,
            }),
        }
    }

    /// A sink that only counts records. Useful when the caller reports
    /// through other means.
    pub fn discard() -> Self {
        Self {
            path: None,
            console: false,
            state: Mutex::new(SinkState {
                file: None,
                records: 0,
            }),
        }
    }

    /// Location of the log file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of records written so far.
    pub fn records(&self) -> usize {
        self.state.lock().records
    }

    /// Append one record. Write failures are reported through tracing and
    /// never propagate to the caller.
    pub fn record(&self, message: impl AsRef<str>) {
        let line = format_record(message.as_ref());

        let mut state = self.state.lock();
        state.records += 1;
        if let Some(file) = state.file.as_mut() {
            write_record(file, &line, "error log");
        }
        if self.console {
            write_record(&mut std::io::stderr().lock(), &line, "stderr");
        }
    }
}

/// Write one formatted record to `out`, warning through tracing on failure.
fn write_record(out: &mut impl Write, line: &str, target: &str) -> bool {
    match out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to write failure record to {target}: {e}");
            false
        }
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink")
            .field("path", &self.path)
            .field("console", &self.console)
            .finish()
    }
}

/// `[timestamp] message`, with continuation lines indented so each record
/// stays visually distinct.
fn format_record(message: &str) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let body = message.trim_end().replace('\n', "\n    ");
    format!("[{stamp}] {body}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn record_appends_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/errors.log");
        let sink = ErrorSink::open(&path, false).unwrap();

        sink.record("[ERROR] Master failed: tape01.avi");
        sink.record("[ERROR] Proxy failed: tape02.avi");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[ERROR] Master failed: tape01.avi"));
        assert!(lines[0].starts_with('['));
        assert_eq!(sink.records(), 2);
        assert_eq!(sink.path(), Some(path.as_path()));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        ErrorSink::open(&path, false).unwrap().record("first");
        ErrorSink::open(&path, false).unwrap().record("second");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn multiline_messages_are_indented() {
        let record = format_record("ffmpeg failed\nline two\n");
        assert!(record.ends_with("ffmpeg failed\n    line two\n"));
    }

    #[test]
    fn concurrent_records_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        let sink = Arc::new(ErrorSink::open(&path, false).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.record(format!("worker={worker} item={i} {}", "x".repeat(200)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(lines
            .iter()
            .all(|l| l.contains("worker=") && l.ends_with(&"x".repeat(200))));
        assert_eq!(sink.records(), 400);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_writes_are_reported_not_dropped() {
        assert!(!write_record(&mut BrokenPipe, "[x] lost\n", "stderr"));

        let mut buf = Vec::new();
        assert!(write_record(&mut buf, "[x] kept\n", "stderr"));
        assert_eq!(buf, b"[x] kept\n");
    }

    #[test]
    fn discard_sink_counts() {
        let sink = ErrorSink::discard();
        sink.record("dropped");
        assert_eq!(sink.records(), 1);
        assert!(sink.path().is_none());
    }
}
