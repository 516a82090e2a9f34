//! Error types for the page-digitize library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DigitizeError`] is **fatal**: the batch cannot start at all (output
//!   directory cannot be created, error log cannot be opened, pdfium cannot
//!   be bound). Returned as `Err(DigitizeError)` from the stage entry points
//!   in [`crate::convert`].
//!
//! * [`ItemError`] is **non-fatal**: a single file failed (corrupt PDF,
//!   unreadable image, OCR engine crash). The orchestrator writes it to the
//!   error log and moves on; the other items in the batch are unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the page-digitize library.
///
/// Item-level failures use [`ItemError`] and end up in the error log rather
/// than being propagated here.
#[derive(Debug, Error)]
pub enum DigitizeError {
    /// The output directory could not be created. Nothing was dispatched.
    #[error("Cannot create output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The error log could not be opened for appending.
    #[error("Cannot open error log '{path}': {source}")]
    ErrorLogUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the working directory, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    /// The OCR executable could not be started.
    #[error("OCR engine unavailable: {0}\nInstall tesseract or pass --tesseract /path/to/tesseract.")]
    OcrEngineUnavailable(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single work item.
///
/// Every variant names enough context for the error-log line to be useful on
/// its own; the orchestrator prefixes it with the item's file name.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The source file is missing, truncated, or not a decodable image/PDF.
    #[error("unreadable input '{path}': {detail}")]
    InputUnreadable { path: PathBuf, detail: String },

    /// The PDF engine failed while opening or rendering.
    #[error("rasterisation failed at page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The PDF engine could not be bound on the worker thread.
    #[error("PDF engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The OCR engine failed to produce the full-text result.
    #[error("text recognition failed: {detail}")]
    RecognitionFailed { detail: String },

    /// The OCR engine failed to produce per-word confidences.
    ///
    /// Recoverable: the record is still written from the full text.
    #[error("word-level recognition failed: {detail}")]
    WordExtractionFailed { detail: String },

    /// An output artifact could not be written.
    #[error("failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The item could not be encoded into its output format.
    #[error("failed to encode '{path}': {detail}")]
    EncodeFailed { path: PathBuf, detail: String },

    /// The worker thread panicked while processing the item.
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    /// The wait ceiling elapsed before the item finished.
    #[error("abandoned after the {secs}s wait ceiling elapsed")]
    Abandoned { secs: u64 },
}

impl ItemError {
    /// Whether processing of the item can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ItemError::WordExtractionFailed { .. })
    }
}
