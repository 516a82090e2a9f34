//! # page-digitize
//!
//! Batch-digitize scanned document collections: rasterize every PDF in a
//! directory into per-page PNGs, then OCR every page image into a JSON
//! record with the recognised text and a confidence score.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents/*.pdf
//!  │
//!  ├─ Stage A  rasterize   pdfium, 300 DPI, largest file first
//!  │            └─ documents_imgs/{stem}_page_{NNNN}.png
//!  │
//!  └─ Stage B  recognize   pad → grayscale → contrast → denoise → binarize
//!               │           → tesseract → filter words (conf > 60)
//!               └─ documents_json/{stem}.json
//! ```
//!
//! Each stage runs its items on a fixed-size worker pool and only returns
//! once every item has either produced its artifacts or had its failure
//! appended to the stage's error log. One bad file never stops a batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_digitize::{rasterize, BatchConfig, RasterizeOptions, Stage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder(Stage::Rasterize)
//!         .input_dir("corpus/documents")
//!         .output_dir("corpus/documents_imgs")
//!         .build()?;
//!     let summary = rasterize(&config, &RasterizeOptions::default(), None).await?;
//!     eprintln!("{} ok, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `digitize` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! page-digitize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod errlog;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, DispatchOrder, ItemProcessor};
pub use config::{
    BatchConfig, BatchConfigBuilder, RasterizeOptions, RecognizeOptions, Stage, TesseractOptions,
    DEFAULT_WAIT_CEILING,
};
pub use convert::{
    rasterize, rasterize_sync, rasterize_with, recognize, recognize_sync, recognize_with,
    RasterizeProcessor, RecognizeProcessor,
};
pub use errlog::{ErrorLog, FailureReport};
pub use error::{DigitizeError, ItemError};
pub use output::{BatchSummary, OutputRecord, RecordMetadata};
pub use pipeline::input::WorkItem;
pub use pipeline::ocr::{Recognizer, RecognizedWord, TesseractCli};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{BatchProgress, NoopProgress, ProgressHandle};
