//! CLI binary for page-digitize.
//!
//! A thin shim over the library crate: each subcommand maps its flags to a
//! `BatchConfig` plus stage options, runs the batch, and prints a summary.
//! Item failures never change the exit status; they are in the error log.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use page_digitize::{
    rasterize_sync, recognize_sync, BatchConfig, BatchProgress, BatchSummary, ProgressHandle,
    RasterizeOptions, RecognizeOptions, Stage, TesseractOptions,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished item. Items finish out
/// of order, so start times are keyed by sequence number.
struct CliProgress {
    bar: ProgressBar,
    unit: &'static str,
    start_times: Mutex<HashMap<usize, Instant>>,
    failures: AtomicUsize,
}

impl CliProgress {
    fn new(unit: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Scanning");
        bar.set_message("Looking for input files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unit,
            start_times: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, sequence: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&sequence))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgress for CliProgress {
    fn on_batch_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>4}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}",
            self.unit
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Dispatching {total_items} {}…", self.unit))
        ));
    }

    fn on_item_start(&self, sequence: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(sequence, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, sequence: usize, total: usize, name: &str) {
        let secs = self.elapsed_secs(sequence);
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            green("✓"),
            sequence,
            total,
            name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_failed(&self, sequence: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(sequence);
        self.failures.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}  {}",
            red("✗"),
            sequence,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pages_milestone(&self, pages_written: usize) {
        self.bar
            .println(format!("  {} {} pages written", cyan("…"), pages_written));
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, abandoned: usize) {
        self.bar.finish_and_clear();
        let total = succeeded + failed + abandoned;
        if failed + abandoned == 0 {
            eprintln!(
                "{} {} {} processed successfully",
                green("✔"),
                bold(&succeeded.to_string()),
                self.unit
            );
        } else {
            eprintln!(
                "{} {}/{} {} processed  ({} failed, {} abandoned)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                self.unit,
                red(&failed.to_string()),
                red(&abandoned.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stage A: render every PDF under corpus/documents at 300 DPI
  digitize rasterize

  # Stage B: OCR the rendered pages into JSON records
  digitize recognize

  # Custom layout and pool size
  digitize rasterize --input scans/ --output pages/ --workers 8
  digitize recognize --input pages/ --output text/ --lang eng+fra

DEFAULT LAYOUT (relative to the working directory):
  corpus/documents        PDFs            (rasterize input)
  corpus/documents_imgs   page PNGs       (rasterize output, recognize input)
  corpus/documents_json   JSON records    (recognize output)
  error_logs/pdf_to_png_errors.log
  error_logs/png_to_text.log

ENVIRONMENT VARIABLES:
  DIGITIZE_INPUT, DIGITIZE_OUTPUT, DIGITIZE_ERROR_LOG, DIGITIZE_WORKERS,
  DIGITIZE_WAIT_CEILING, DIGITIZE_DPI, DIGITIZE_MIN_SIZE, DIGITIZE_TESSERACT,
  DIGITIZE_LANG, DIGITIZE_VERBOSE, DIGITIZE_QUIET, DIGITIZE_NO_PROGRESS
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Overrides the log filter entirely

EXIT STATUS:
  0 once every item reached a terminal state, even if some failed.
  Non-zero only when the batch could not start (e.g. unwritable output).
"#;

/// Batch-digitize scanned PDFs: render pages to PNG, then OCR them to JSON.
#[derive(Parser, Debug)]
#[command(
    name = "digitize",
    version,
    about = "Batch-digitize scanned PDFs: render pages to PNG, then OCR them to JSON",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DIGITIZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DIGITIZE_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "DIGITIZE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every PDF in the input directory to one PNG per page.
    Rasterize {
        #[command(flatten)]
        batch: BatchArgs,

        /// Rendering DPI (72–600).
        #[arg(long, env = "DIGITIZE_DPI", default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=600))]
        dpi: u32,

        /// Directory containing libpdfium.
        #[arg(long, env = "PDFIUM_LIB_PATH")]
        pdfium_lib: Option<PathBuf>,
    },

    /// OCR every PNG/JPEG in the input directory into a JSON record.
    Recognize {
        #[command(flatten)]
        batch: BatchArgs,

        /// Smaller images are padded with white up to this size.
        #[arg(long, env = "DIGITIZE_MIN_SIZE", default_value = "32x32",
              value_parser = parse_min_size)]
        min_size: (u32, u32),

        /// Path to the tesseract executable.
        #[arg(long, env = "DIGITIZE_TESSERACT", default_value = "tesseract")]
        tesseract: PathBuf,

        /// Tesseract language pack(s), e.g. `eng` or `eng+fra`.
        #[arg(long, env = "DIGITIZE_LANG", default_value = "eng")]
        lang: String,
    },
}

/// Flags shared by both stages. Unset directories fall back to the stage's
/// default layout.
#[derive(Args, Debug)]
struct BatchArgs {
    /// Directory to scan for input files.
    #[arg(short, long, env = "DIGITIZE_INPUT")]
    input: Option<PathBuf>,

    /// Directory to write artifacts into (created if missing).
    #[arg(short, long, env = "DIGITIZE_OUTPUT")]
    output: Option<PathBuf>,

    /// Append-only log receiving one block per failed item.
    #[arg(long, env = "DIGITIZE_ERROR_LOG")]
    error_log: Option<PathBuf>,

    /// Worker pool size (default: 4 for rasterize, CPU count for recognize).
    #[arg(short, long, env = "DIGITIZE_WORKERS")]
    workers: Option<usize>,

    /// Give up on unfinished items after this many seconds.
    #[arg(long, env = "DIGITIZE_WAIT_CEILING", default_value_t = 86_400)]
    wait_ceiling: u64,
}

impl BatchArgs {
    fn to_config(&self, stage: Stage) -> Result<BatchConfig> {
        let mut builder = BatchConfig::builder(stage)
            .wait_ceiling(Duration::from_secs(self.wait_ceiling));
        if let Some(ref dir) = self.input {
            builder = builder.input_dir(dir);
        }
        if let Some(ref dir) = self.output {
            builder = builder.output_dir(dir);
        }
        if let Some(ref path) = self.error_log {
            builder = builder.error_log(path);
        }
        if let Some(n) = self.workers {
            builder = builder.workers(n);
        }
        builder.build().context("Invalid configuration")
    }
}

/// Parse `WxH` (e.g. `32x32`).
fn parse_min_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    if w == 0 || h == 0 {
        return Err(format!("minimum size must be at least 1x1, got '{s}'"));
    }
    Ok((w, h))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would fight with the bar for the terminal.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let (stage, unit) = match cli.command {
        Command::Rasterize { .. } => (Stage::Rasterize, "documents"),
        Command::Recognize { .. } => (Stage::Recognize, "images"),
    };
    let progress: Option<ProgressHandle> = if show_progress {
        Some(CliProgress::new(unit) as ProgressHandle)
    } else {
        None
    };

    // ── Run stage ────────────────────────────────────────────────────────
    let (config, summary) = match &cli.command {
        Command::Rasterize {
            batch,
            dpi,
            pdfium_lib,
        } => {
            let config = batch.to_config(stage)?;
            let options = RasterizeOptions {
                dpi: *dpi,
                pdfium_library_dir: pdfium_lib.clone(),
                ..Default::default()
            };
            let summary = rasterize_sync(&config, &options, progress)
                .context("Rasterization could not start")?;
            (config, summary)
        }
        Command::Recognize {
            batch,
            min_size,
            tesseract,
            lang,
        } => {
            let config = batch.to_config(stage)?;
            let options = RecognizeOptions {
                min_width: min_size.0,
                min_height: min_size.1,
                tesseract: TesseractOptions {
                    executable: tesseract.clone(),
                    language: lang.clone(),
                    ..Default::default()
                },
                ..Default::default()
            };
            let summary = recognize_sync(&config, &options, progress)
                .context("Recognition could not start")?;
            (config, summary)
        }
    };

    if !cli.quiet {
        print_summary(&config, &summary, show_progress);
    }
    Ok(())
}

fn print_summary(config: &BatchConfig, summary: &BatchSummary, bar_shown: bool) {
    // The bar already printed its own tick line.
    if !bar_shown {
        eprintln!(
            "{}  {}/{} {} items in {}ms",
            if summary.is_clean() { green("✔") } else { cyan("⚠") },
            summary.succeeded,
            summary.discovered,
            config.stage.name(),
            summary.elapsed_ms,
        );
    }
    eprintln!(
        "   output  →  {}",
        bold(&config.output_dir.display().to_string())
    );
    if !summary.is_clean() {
        eprintln!(
            "   {} failures logged to {}",
            red(&(summary.failed + summary.abandoned).to_string()),
            bold(&config.error_log.display().to_string())
        );
    } else {
        eprintln!("   {}", dim(&format!("{}ms total", summary.elapsed_ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_size_parses_wxh() {
        assert_eq!(parse_min_size("32x32"), Ok((32, 32)));
        assert_eq!(parse_min_size("640X480"), Ok((640, 480)));
        assert!(parse_min_size("32").is_err());
        assert!(parse_min_size("0x10").is_err());
        assert!(parse_min_size("ax10").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn unset_directories_use_stage_defaults() {
        let cli = Cli::try_parse_from(["digitize", "recognize", "--workers", "2"]).unwrap();
        let Command::Recognize { batch, .. } = cli.command else {
            panic!("expected recognize");
        };
        let config = batch.to_config(Stage::Recognize).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.input_dir, Stage::Recognize.default_input_dir());
        assert_eq!(config.error_log, Stage::Recognize.default_error_log());
    }
}
