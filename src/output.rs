//! Output types: the per-image OCR record and the per-batch summary.

use serde::{Deserialize, Serialize};

/// One recognised page image, serialised as `<image stem>.json`.
///
/// Field names and nesting are a stable on-disk format consumed by the
/// downstream text-processing scripts; do not rename them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Image file name, including extension.
    pub filename: String,
    /// Full recognised text, trimmed.
    pub text: String,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// 1-based position of the image in name order.
    pub page_number: usize,
    /// `[width, height]` of the image the engine actually saw.
    pub dimensions: [u32; 2],
    /// Mean confidence (0–1) of the words that passed the filter, rounded
    /// to 4 decimals; 0.0 when none passed.
    pub confidence: f64,
    pub ocr_engine: String,
    /// Number of words that passed the confidence filter.
    pub text_blocks: usize,
}

/// Counts for one finished batch.
///
/// Informational only: individual failures are in the error log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items still unfinished when the wait ceiling elapsed.
    pub abandoned: usize,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    /// Every discovered item produced its artifacts.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.abandoned == 0
    }
}
