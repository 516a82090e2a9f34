//! OCR behind the [`Recognizer`] capability trait, plus the word filter.
//!
//! The production recognizer drives the `tesseract` executable: the page is
//! written to a temporary PNG and tesseract is run twice, once for plain text
//! and once in TSV mode for per-word confidences. Shelling out keeps the
//! build free of leptonica/tesseract headers and matches how the engine is
//! installed on the machines that run these batches.

use crate::config::TesseractOptions;
use crate::error::ItemError;
use image::{GrayImage, ImageFormat};
use std::io::{BufWriter, Write};
use std::process::Command;
use tracing::debug;

/// Label recorded in `metadata.ocr_engine` for [`TesseractCli`].
pub const TESSERACT_ENGINE_LABEL: &str = "Tesseract (CLI)";

/// One recognised word with the engine's 0–100 confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedWord {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// An OCR capability.
pub trait Recognizer: Send + Sync {
    /// Full recognised text of the page.
    fn recognize_text(&self, image: &GrayImage) -> Result<String, ItemError>;

    /// Word list with per-word confidence on a 0–100 scale.
    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<RecognizedWord>, ItemError>;

    /// Fixed engine label written into every record.
    fn engine_label(&self) -> &str;
}

/// Words that passed the confidence filter, and their mean confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceSummary {
    pub kept: Vec<RecognizedWord>,
    /// Mean of `confidence / 100` over `kept`, rounded to 4 decimals.
    pub mean: f64,
}

impl ConfidenceSummary {
    /// Keep words scoring strictly above `threshold` (0–100 scale).
    pub fn from_words(words: Vec<RecognizedWord>, threshold: f32) -> Self {
        let kept: Vec<RecognizedWord> = words
            .into_iter()
            .filter(|w| w.confidence > threshold)
            .collect();

        let mean = if kept.is_empty() {
            0.0
        } else {
            let sum: f64 = kept.iter().map(|w| w.confidence as f64 / 100.0).sum();
            round4(sum / kept.len() as f64)
        };

        Self { kept, mean }
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// [`Recognizer`] that runs the `tesseract` command-line program.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    options: TesseractOptions,
}

impl TesseractCli {
    pub fn new(options: TesseractOptions) -> Self {
        Self { options }
    }

    /// Check that the executable runs, so a missing install fails the run
    /// up front instead of failing every item.
    pub fn probe(&self) -> Result<String, ItemError> {
        let output = Command::new(&self.options.executable)
            .arg("--version")
            .output()
            .map_err(|e| ItemError::RecognitionFailed {
                detail: format!(
                    "cannot run '{}': {}",
                    self.options.executable.display(),
                    e
                ),
            })?;
        // Older releases print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Run tesseract on `image`, writing results to stdout; `format` is an
    /// optional config name such as `tsv`.
    fn run(&self, image: &GrayImage, format: Option<&str>) -> Result<String, String> {
        let input = tempfile::Builder::new()
            .prefix("digitize-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| format!("temp file: {e}"))?;
        {
            let mut writer = BufWriter::new(input.as_file());
            image
                .write_to(&mut writer, ImageFormat::Png)
                .map_err(|e| format!("encode temp PNG: {e}"))?;
            writer.flush().map_err(|e| format!("flush temp PNG: {e}"))?;
        }

        let mut cmd = Command::new(&self.options.executable);
        cmd.arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.options.language)
            .arg("--dpi")
            .arg(self.options.dpi.to_string())
            .arg("--psm")
            .arg(self.options.page_seg_mode.to_string())
            .arg("--oem")
            .arg(self.options.engine_mode.to_string());
        if let Some(format) = format {
            cmd.arg(format);
        }

        debug!("Running {:?}", cmd);
        let output = cmd.output().map_err(|e| {
            format!(
                "cannot run '{}': {}",
                self.options.executable.display(),
                e
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Recognizer for TesseractCli {
    fn recognize_text(&self, image: &GrayImage) -> Result<String, ItemError> {
        self.run(image, None)
            .map_err(|detail| ItemError::RecognitionFailed { detail })
    }

    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<RecognizedWord>, ItemError> {
        let tsv = self
            .run(image, Some("tsv"))
            .map_err(|detail| ItemError::WordExtractionFailed { detail })?;
        parse_tsv_words(&tsv).map_err(|detail| ItemError::WordExtractionFailed { detail })
    }

    fn engine_label(&self) -> &str {
        TESSERACT_ENGINE_LABEL
    }
}

/// Extract word rows (level 5) from tesseract's TSV output.
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. Structural rows carry `conf = -1` and are
/// skipped, as are words that are empty after trimming.
pub fn parse_tsv_words(tsv: &str) -> Result<Vec<RecognizedWord>, String> {
    let mut words = Vec::new();
    for (lineno, line) in tsv.lines().enumerate() {
        if lineno == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.splitn(12, '\t').collect();
        if cols.len() < 11 {
            return Err(format!("malformed TSV row {}: {:?}", lineno + 1, line));
        }
        if cols[0] != "5" {
            continue;
        }

        let confidence: f32 = cols[10]
            .trim()
            .parse()
            .map_err(|_| format!("bad confidence on row {}: {:?}", lineno + 1, cols[10]))?;
        let text = cols.get(11).map(|t| t.trim()).unwrap_or_default();
        if confidence < 0.0 || text.is_empty() {
            continue;
        }
        words.push(RecognizedWord::new(text, confidence));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_is_excluded_just_above_is_kept() {
        let summary = ConfidenceSummary::from_words(
            vec![
                RecognizedWord::new("edge", 60.0),
                RecognizedWord::new("above", 60.0001),
            ],
            60.0,
        );
        assert_eq!(summary.kept.len(), 1);
        assert_eq!(summary.kept[0].text, "above");
    }

    #[test]
    fn empty_survivor_set_averages_to_zero() {
        let summary = ConfidenceSummary::from_words(
            vec![RecognizedWord::new("smudge", 12.0)],
            60.0,
        );
        assert!(summary.kept.is_empty());
        assert_eq!(summary.mean, 0.0);
        assert!(!summary.mean.is_nan());

        let none = ConfidenceSummary::from_words(Vec::new(), 60.0);
        assert_eq!(none.mean, 0.0);
    }

    #[test]
    fn mean_is_normalised_and_rounded() {
        let summary = ConfidenceSummary::from_words(
            vec![
                RecognizedWord::new("a", 91.0),
                RecognizedWord::new("b", 88.0),
                RecognizedWord::new("c", 70.0),
                RecognizedWord::new("noise", 30.0),
            ],
            60.0,
        );
        assert_eq!(summary.kept.len(), 3);
        // (0.91 + 0.88 + 0.70) / 3 = 0.83
        assert_eq!(summary.mean, 0.83);

        let summary = ConfidenceSummary::from_words(
            vec![RecognizedWord::new("a", 96.123456)],
            60.0,
        );
        assert_eq!(summary.mean, 0.9612);
    }

    #[test]
    fn tsv_word_rows_are_extracted() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t2550\t3300\t-1\t\n\
4\t1\t1\t1\t1\t0\t100\t100\t800\t40\t-1\t\n\
5\t1\t1\t1\t1\t1\t100\t100\t200\t40\t95.512\tMEMORANDUM\n\
5\t1\t1\t1\t1\t2\t320\t100\t90\t40\t41.000000\tFOR\n\
5\t1\t1\t1\t1\t3\t420\t100\t10\t40\t88\t \n";

        let words = parse_tsv_words(tsv).unwrap();
        assert_eq!(
            words,
            vec![
                RecognizedWord::new("MEMORANDUM", 95.512),
                RecognizedWord::new("FOR", 41.0),
            ]
        );
    }

    #[test]
    fn tsv_word_text_may_contain_spaces_and_tabs() {
        let tsv = "5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t77\ta\tb\n";
        let words = parse_tsv_words(tsv).unwrap();
        assert_eq!(words[0].text, "a\tb");
    }

    #[test]
    fn malformed_tsv_is_an_error() {
        assert!(parse_tsv_words("5\t1\t1\n").is_err());
        assert!(parse_tsv_words("5\t1\t1\t1\t1\t1\t0\t0\t1\t1\tNaNx\tword\n").is_err());
    }

    #[test]
    fn missing_executable_fails_probe() {
        let cli = TesseractCli::new(TesseractOptions {
            executable: "/definitely/not/tesseract".into(),
            ..Default::default()
        });
        assert!(cli.probe().is_err());
        assert!(matches!(
            cli.recognize_words(&GrayImage::new(4, 4)),
            Err(ItemError::WordExtractionFailed { .. })
        ));
        assert!(matches!(
            cli.recognize_text(&GrayImage::new(4, 4)),
            Err(ItemError::RecognitionFailed { .. })
        ));
    }
}
