//! Input discovery: turn a source directory into a list of work items.
//!
//! The scan is deliberately flat (no recursion) and only looks at regular
//! files. Hidden files (`.DS_Store`, `._scan.pdf` resource forks left by
//! macOS copies) are never selected; they are either junk or unreadable
//! duplicates of real inputs.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One unit of batch work: a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
    /// 1-based position in dispatch order; 0 until the batch is ordered.
    pub sequence: usize,
}

impl WorkItem {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            sequence: 0,
        }
    }

    /// File name used in log lines and error reports.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// File name without its final extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name())
    }
}

/// Whether a file name is hidden by the leading-dot convention.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether `path` has one of `extensions` (lower-case, no dot), ignoring case.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|want| *want == e)
        })
        .unwrap_or(false)
}

/// List every non-hidden regular file in `dir` matching `extensions`.
///
/// A missing or unreadable directory is not an error: it is logged and
/// treated as an empty batch. Entries that vanish or cannot be stat'ed
/// mid-scan are skipped with a warning.
pub fn discover(dir: &Path, extensions: &[&str]) -> Vec<WorkItem> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read input directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut items = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let name = entry.file_name();
        if is_hidden(&name.to_string_lossy()) {
            debug!("Skipping hidden file {:?}", name);
            continue;
        }

        let path = entry.path();
        if !has_extension(&path, extensions) {
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.is_file() => items.push(WorkItem::new(path, meta.len())),
            Ok(_) => {}
            Err(e) => warn!("Cannot stat {}: {}", path.display(), e),
        }
    }

    debug!("Discovered {} items in {}", items.len(), dir.display());
    items
}
