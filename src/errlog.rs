//! Append-only failure log shared by every worker in a batch.
//!
//! One file per run, opened in append mode so consecutive runs accumulate.
//! Each report is written and flushed under a single lock acquisition, so
//! concurrent reports never interleave and a batch killed half-way still
//! leaves every failure it saw on disk.
//!
//! The log never propagates its own I/O errors: a full disk must not take
//! the batch down with it. Such failures go to stderr instead.

use crate::error::DigitizeError;
use chrono::{DateTime, Local, SecondsFormat};
use std::error::Error as StdError;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// A single failure, as it will appear in the log.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub timestamp: DateTime<Local>,
    /// File name of the item that failed.
    pub source: String,
    pub message: String,
    /// Rendered error chain below `message`, outermost first.
    pub causes: Vec<String>,
}

impl FailureReport {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            source: source.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Attach `err`'s source chain (not `err` itself, whose text is usually
    /// already in `message`).
    pub fn with_cause_chain(mut self, err: &(dyn StdError + 'static)) -> Self {
        let mut next = err.source();
        while let Some(cause) = next {
            self.causes.push(cause.to_string());
            next = cause.source();
        }
        self
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] [ERROR] {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.source,
            self.message
        )?;
        for cause in &self.causes {
            writeln!(f, "    caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Mutex-guarded append-only error log.
pub struct ErrorLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    reported: AtomicUsize,
}

impl ErrorLog {
    /// Open (or create) the log at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DigitizeError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |source| DigitizeError::ErrorLogUnavailable {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(unavailable)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            reported: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of reports accepted so far in this run.
    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::SeqCst)
    }

    /// Record a failure for `source` with a plain message.
    pub fn report(&self, source: &str, message: impl Into<String>) {
        self.append(FailureReport::new(source, message));
    }

    /// Record a failure for `source`, including `err` and its cause chain.
    pub fn report_error(&self, source: &str, err: &(dyn StdError + 'static)) {
        self.append(FailureReport::new(source, err.to_string()).with_cause_chain(err));
    }

    /// Write one report and flush before releasing the lock.
    pub fn append(&self, report: FailureReport) {
        self.reported.fetch_add(1, Ordering::SeqCst);
        let block = report.to_string();

        // A poisoned lock only means another worker panicked mid-write; the
        // file handle itself is still usable.
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = writer
            .write_all(block.as_bytes())
            .and_then(|_| writer.flush());
        drop(writer);

        if let Err(e) = result {
            eprintln!(
                "Failed to write error log '{}': {e}\n{block}",
                self.path.display()
            );
            warn!("Error log write failed for {}: {}", report.source, e);
        }
    }
}

impl fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLog")
            .field("path", &self.path)
            .field("reported", &self.reported())
            .finish()
    }
}
