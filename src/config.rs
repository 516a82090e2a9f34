//! Configuration types for the two batch stages.
//!
//! Directory layout and pool size live in [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Stage-specific knobs live in [`RasterizeOptions`]
//! and [`RecognizeOptions`] so neither stage carries fields it never reads.
//!
//! Defaults reproduce the fixed layout the pipeline has always used relative
//! to the working directory:
//!
//! ```text
//! corpus/documents       ── rasterize ──▶  corpus/documents_imgs
//! corpus/documents_imgs  ── recognize ──▶  corpus/documents_json
//! error_logs/pdf_to_png_errors.log, error_logs/png_to_text.log
//! ```

use crate::batch::DispatchOrder;
use crate::error::DigitizeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which of the two pipeline stages a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// PDF → one PNG per page.
    Rasterize,
    /// Page image → one JSON record.
    Recognize,
}

impl Stage {
    /// File extensions (lower-case, no dot) selected as work items.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Stage::Rasterize => &["pdf"],
            Stage::Recognize => &["png", "jpg", "jpeg"],
        }
    }

    /// Order in which discovered items are dispatched.
    ///
    /// Rasterisation dispatches the largest PDFs first so the slowest jobs
    /// don't end up alone at the tail of the batch. Recognition goes by name
    /// because output page numbers are derived from dispatch order.
    pub fn dispatch_order(self) -> DispatchOrder {
        match self {
            Stage::Rasterize => DispatchOrder::LargestFirst,
            Stage::Recognize => DispatchOrder::ByName,
        }
    }

    /// Default worker count for the stage.
    pub fn default_workers(self) -> usize {
        match self {
            Stage::Rasterize => 4,
            Stage::Recognize => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn default_input_dir(self) -> PathBuf {
        match self {
            Stage::Rasterize => PathBuf::from("corpus/documents"),
            Stage::Recognize => PathBuf::from("corpus/documents_imgs"),
        }
    }

    pub fn default_output_dir(self) -> PathBuf {
        match self {
            Stage::Rasterize => PathBuf::from("corpus/documents_imgs"),
            Stage::Recognize => PathBuf::from("corpus/documents_json"),
        }
    }

    pub fn default_error_log(self) -> PathBuf {
        match self {
            Stage::Rasterize => PathBuf::from("error_logs/pdf_to_png_errors.log"),
            Stage::Recognize => PathBuf::from("error_logs/png_to_text.log"),
        }
    }

    /// Short lower-case name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Rasterize => "rasterize",
            Stage::Recognize => "recognize",
        }
    }
}

/// Directory layout and worker-pool settings shared by both stages.
///
/// # Example
/// ```rust
/// use page_digitize::{BatchConfig, Stage};
///
/// let config = BatchConfig::builder(Stage::Rasterize)
///     .input_dir("scans")
///     .output_dir("scans_imgs")
///     .workers(6)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub stage: Stage,

    /// Directory scanned (non-recursively) for work items.
    pub input_dir: PathBuf,

    /// Directory receiving one artifact set per item. Created if absent.
    pub output_dir: PathBuf,

    /// Append-only failure log shared by all workers.
    pub error_log: PathBuf,

    /// Fixed size of the worker pool. Default: 4 for rasterisation, the
    /// number of available CPUs for recognition.
    pub workers: usize,

    /// How long the completion barrier waits before abandoning unfinished
    /// items. Default: 24 hours.
    pub wait_ceiling: Duration,
}

impl BatchConfig {
    /// Create a builder pre-filled with the stage's defaults.
    pub fn builder(stage: Stage) -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self {
                stage,
                input_dir: stage.default_input_dir(),
                output_dir: stage.default_output_dir(),
                error_log: stage.default_error_log(),
                workers: stage.default_workers(),
                wait_ceiling: DEFAULT_WAIT_CEILING,
            },
        }
    }
}

/// Ceiling on the completion barrier before unfinished work is abandoned.
pub const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.error_log = path.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.wait_ceiling = ceiling;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, DigitizeError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(DigitizeError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.wait_ceiling.is_zero() {
            return Err(DigitizeError::InvalidConfig(
                "Wait ceiling must be greater than zero".into(),
            ));
        }
        if c.input_dir == c.output_dir {
            return Err(DigitizeError::InvalidConfig(format!(
                "Input and output directories must differ (both '{}')",
                c.input_dir.display()
            )));
        }
        Ok(self.config)
    }
}

/// Stage A settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterizeOptions {
    /// Rendering resolution. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Emit a progress notice every time the run-wide page total crosses a
    /// multiple of this value. Default: 20.
    pub progress_interval: usize,

    /// Directory containing libpdfium. `None` tries the working directory
    /// and then the system library path.
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for RasterizeOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            progress_interval: 20,
            pdfium_library_dir: None,
        }
    }
}

impl RasterizeOptions {
    pub fn validate(&self) -> Result<(), DigitizeError> {
        if !(72..=600).contains(&self.dpi) {
            return Err(DigitizeError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.dpi
            )));
        }
        if self.progress_interval == 0 {
            return Err(DigitizeError::InvalidConfig(
                "Progress interval must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Stage B settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeOptions {
    /// Images narrower than this are padded with white on the right. Default: 32.
    pub min_width: u32,

    /// Images shorter than this are padded with white at the bottom. Default: 32.
    pub min_height: u32,

    /// Words must score strictly above this (0–100 scale). Default: 60.0.
    pub confidence_threshold: f32,

    /// Gain applied by the contrast-rescale step. Default: 1.5.
    pub contrast_gain: f32,

    /// Settings handed to the Tesseract adapter.
    pub tesseract: TesseractOptions,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            min_width: 32,
            min_height: 32,
            confidence_threshold: 60.0,
            contrast_gain: 1.5,
            tesseract: TesseractOptions::default(),
        }
    }
}

impl RecognizeOptions {
    pub fn validate(&self) -> Result<(), DigitizeError> {
        if self.min_width == 0 || self.min_height == 0 {
            return Err(DigitizeError::InvalidConfig(format!(
                "Minimum size must be at least 1x1, got {}x{}",
                self.min_width, self.min_height
            )));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(DigitizeError::InvalidConfig(format!(
                "Confidence threshold must be 0–100, got {}",
                self.confidence_threshold
            )));
        }
        if !self.contrast_gain.is_finite() || self.contrast_gain <= 0.0 {
            return Err(DigitizeError::InvalidConfig(format!(
                "Contrast gain must be positive, got {}",
                self.contrast_gain
            )));
        }
        Ok(())
    }
}

/// Invocation settings for the `tesseract` executable.
///
/// Defaults mirror the engine configuration the corpus was tuned for:
/// English, a 300 DPI hint, fully automatic page segmentation (`--psm 3`)
/// and the LSTM-only engine (`--oem 1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractOptions {
    pub executable: PathBuf,
    pub language: String,
    pub dpi: u32,
    pub page_seg_mode: u8,
    pub engine_mode: u8,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            dpi: 300,
            page_seg_mode: 3,
            engine_mode: 1,
        }
    }
}
