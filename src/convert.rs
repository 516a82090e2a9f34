//! Stage entry points and the item processors behind them.
//!
//! Both stages share the same shape: validate, bind the engine, create the
//! output directory, open the error log, discover and order the inputs, then
//! hand everything to [`crate::batch::run_batch`]. The functions here differ
//! only in *what* happens to a single item:
//!
//! * [`RasterizeProcessor`] renders every page of one PDF to
//!   `{stem}_page_{NNNN}.png`.
//! * [`RecognizeProcessor`] preprocesses one page image, runs OCR, filters
//!   words by confidence, and writes `{stem}.json`.
//!
//! The `*_with` variants accept any [`Rasterizer`] / [`Recognizer`], which
//! is how the integration tests run whole batches without pdfium or
//! tesseract installed.

use crate::batch::{self, ItemProcessor};
use crate::config::{BatchConfig, RasterizeOptions, RecognizeOptions, Stage};
use crate::errlog::ErrorLog;
use crate::error::{DigitizeError, ItemError};
use crate::output::{BatchSummary, OutputRecord, RecordMetadata};
use crate::pipeline::input::WorkItem;
use crate::pipeline::ocr::{ConfidenceSummary, Recognizer, TesseractCli};
use crate::pipeline::render::{page_file_name, PdfiumRasterizer, Rasterizer};
use crate::pipeline::{encode, preprocess};
use crate::progress::{self, ProgressHandle};
use image::{DynamicImage, RgbImage};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the sync wrappers wait for still-running blocking workers when
/// the runtime shuts down after an abandoned batch.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ── Stage A: PDF → PNG ──────────────────────────────────────────────────

/// Run-wide count of written pages with a milestone every `interval` pages.
#[derive(Debug)]
pub struct PageCounter {
    written: AtomicUsize,
    interval: usize,
}

impl PageCounter {
    pub fn new(interval: usize) -> Self {
        Self {
            written: AtomicUsize::new(0),
            interval: interval.max(1),
        }
    }

    /// Count one page. Returns the new total when it lands on a multiple of
    /// the interval.
    pub fn record_page(&self) -> Option<usize> {
        let total = self.written.fetch_add(1, Ordering::Relaxed) + 1;
        (total % self.interval == 0).then_some(total)
    }

    pub fn total(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

/// Renders every page of one PDF into the output directory.
pub struct RasterizeProcessor {
    rasterizer: Arc<dyn Rasterizer>,
    output_dir: PathBuf,
    dpi: u32,
    pages: PageCounter,
    progress: ProgressHandle,
}

impl RasterizeProcessor {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        output_dir: impl Into<PathBuf>,
        options: &RasterizeOptions,
        progress: ProgressHandle,
    ) -> Self {
        Self {
            rasterizer,
            output_dir: output_dir.into(),
            dpi: options.dpi,
            pages: PageCounter::new(options.progress_interval),
            progress,
        }
    }

    /// Pages written so far across every document of the run.
    pub fn pages_written(&self) -> usize {
        self.pages.total()
    }
}

impl ItemProcessor for RasterizeProcessor {
    fn process(&self, item: &WorkItem) -> Result<(), ItemError> {
        let stem = item.stem();
        let rendered = self.rasterizer.render_document(
            &item.path,
            self.dpi,
            &mut |index: usize, _count: usize, image: RgbImage| {
                let path = self.output_dir.join(page_file_name(&stem, index + 1));
                encode::write_page_png(&image, &path)?;
                if let Some(total) = self.pages.record_page() {
                    info!("Pages processed: {}", total);
                    self.progress.on_pages_milestone(total);
                }
                Ok(())
            },
        )?;
        debug!("{}: wrote {} pages", item.name(), rendered);
        Ok(())
    }
}

/// Render every PDF in `config.input_dir` with pdfium.
pub async fn rasterize(
    config: &BatchConfig,
    options: &RasterizeOptions,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    options.validate()?;
    let library_dir = options.pdfium_library_dir.clone();
    let rasterizer = tokio::task::spawn_blocking(move || PdfiumRasterizer::new(library_dir))
        .await
        .map_err(|e| DigitizeError::Internal(format!("pdfium bind task: {e}")))??;
    rasterize_with(config, options, Arc::new(rasterizer), progress).await
}

/// Render every PDF in `config.input_dir` with the given engine.
pub async fn rasterize_with(
    config: &BatchConfig,
    options: &RasterizeOptions,
    rasterizer: Arc<dyn Rasterizer>,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    expect_stage(config, Stage::Rasterize)?;
    options.validate()?;
    let progress = progress.unwrap_or_else(progress::noop);

    let (errors, items) = start_batch(config)?;
    let processor = Arc::new(RasterizeProcessor::new(
        rasterizer,
        &config.output_dir,
        options,
        Arc::clone(&progress),
    ));

    let summary = batch::run_batch(items, Arc::clone(&processor), config, errors, progress).await;
    info!("[rasterize] {} pages written", processor.pages_written());
    Ok(summary)
}

/// Blocking wrapper around [`rasterize`].
pub fn rasterize_sync(
    config: &BatchConfig,
    options: &RasterizeOptions,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    block_on_bounded(rasterize(config, options, progress))?
}

// ── Stage B: image → JSON ───────────────────────────────────────────────

/// Recognises one page image and writes its JSON record.
pub struct RecognizeProcessor {
    recognizer: Arc<dyn Recognizer>,
    output_dir: PathBuf,
    options: RecognizeOptions,
    errors: Arc<ErrorLog>,
}

impl RecognizeProcessor {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        output_dir: impl Into<PathBuf>,
        options: RecognizeOptions,
        errors: Arc<ErrorLog>,
    ) -> Self {
        Self {
            recognizer,
            output_dir: output_dir.into(),
            options,
            errors,
        }
    }

    /// Preprocess `image`, run OCR, and assemble the record for `name`.
    ///
    /// A failed word-level pass is reported to the error log and the record
    /// is still produced from the full text, with no surviving words.
    pub fn build_record(
        &self,
        name: &str,
        page_number: usize,
        image: DynamicImage,
    ) -> Result<OutputRecord, ItemError> {
        let padded = preprocess::ensure_minimum_dimensions(
            image,
            self.options.min_width,
            self.options.min_height,
        );
        let prepared = preprocess::preprocess(&padded, self.options.contrast_gain);

        let text = self.recognizer.recognize_text(&prepared)?;

        let words = match self.recognizer.recognize_words(&prepared) {
            Ok(words) => words,
            Err(e) => {
                let e = if e.is_recoverable() {
                    e
                } else {
                    ItemError::WordExtractionFailed {
                        detail: e.to_string(),
                    }
                };
                warn!("{}: {}; continuing without word confidences", name, e);
                self.errors.report_error(name, &e);
                Vec::new()
            }
        };
        let summary = ConfidenceSummary::from_words(words, self.options.confidence_threshold);

        Ok(OutputRecord {
            filename: name.to_string(),
            text: text.trim().to_string(),
            metadata: RecordMetadata {
                page_number,
                dimensions: [prepared.width(), prepared.height()],
                confidence: summary.mean,
                ocr_engine: self.recognizer.engine_label().to_string(),
                text_blocks: summary.kept.len(),
            },
        })
    }
}

impl ItemProcessor for RecognizeProcessor {
    fn process(&self, item: &WorkItem) -> Result<(), ItemError> {
        let name = item.name();
        let image = image::open(&item.path).map_err(|e| ItemError::InputUnreadable {
            path: item.path.clone(),
            detail: e.to_string(),
        })?;

        let record = self.build_record(&name, item.sequence, image)?;
        encode::write_record(&record, &encode::record_path(&self.output_dir, &name))?;
        debug!(
            "{}: {} words kept, confidence {:.4}",
            name, record.metadata.text_blocks, record.metadata.confidence
        );
        Ok(())
    }
}

/// Recognise every image in `config.input_dir` with tesseract.
pub async fn recognize(
    config: &BatchConfig,
    options: &RecognizeOptions,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    options.validate()?;
    let cli = TesseractCli::new(options.tesseract.clone());
    let cli = tokio::task::spawn_blocking(move || cli.probe().map(|banner| (cli, banner)))
        .await
        .map_err(|e| DigitizeError::Internal(format!("tesseract probe task: {e}")))?;
    let (cli, banner) = cli.map_err(|e| DigitizeError::OcrEngineUnavailable(e.to_string()))?;
    info!("OCR engine: {}", banner);
    recognize_with(config, options, Arc::new(cli), progress).await
}

/// Recognise every image in `config.input_dir` with the given engine.
pub async fn recognize_with(
    config: &BatchConfig,
    options: &RecognizeOptions,
    recognizer: Arc<dyn Recognizer>,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    expect_stage(config, Stage::Recognize)?;
    options.validate()?;
    let progress = progress.unwrap_or_else(progress::noop);

    let (errors, items) = start_batch(config)?;
    let processor = Arc::new(RecognizeProcessor::new(
        recognizer,
        &config.output_dir,
        options.clone(),
        Arc::clone(&errors),
    ));

    Ok(batch::run_batch(items, processor, config, errors, progress).await)
}

/// Blocking wrapper around [`recognize`].
pub fn recognize_sync(
    config: &BatchConfig,
    options: &RecognizeOptions,
    progress: Option<ProgressHandle>,
) -> Result<BatchSummary, DigitizeError> {
    block_on_bounded(recognize(config, options, progress))?
}

// ── Shared ──────────────────────────────────────────────────────────────

fn expect_stage(config: &BatchConfig, stage: Stage) -> Result<(), DigitizeError> {
    if config.stage != stage {
        return Err(DigitizeError::InvalidConfig(format!(
            "{} batch given a {} configuration",
            stage.name(),
            config.stage.name()
        )));
    }
    Ok(())
}

/// Output directory, then error log, then discovery. Nothing is dispatched
/// if either of the first two fails.
fn start_batch(config: &BatchConfig) -> Result<(Arc<ErrorLog>, Vec<WorkItem>), DigitizeError> {
    batch::prepare_output_dir(&config.output_dir)?;
    let errors = Arc::new(ErrorLog::open(&config.error_log)?);
    let items = batch::collect_items(config);
    info!(
        "[{}] {} → {} ({} items, errors to {})",
        config.stage.name(),
        config.input_dir.display(),
        config.output_dir.display(),
        items.len(),
        errors.path().display()
    );
    Ok((errors, items))
}

/// Drive `fut` on a fresh multi-thread runtime.
///
/// Shutdown waits at most [`SHUTDOWN_GRACE`] for blocking workers, so an
/// item stuck past the wait ceiling cannot keep the process alive.
fn block_on_bounded<F: Future>(fut: F) -> Result<F::Output, DigitizeError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| DigitizeError::Internal(format!("Failed to create tokio runtime: {e}")))?;
    let output = rt.block_on(fut);
    rt.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}
