//! Whole-batch integration tests with in-memory engines.
//!
//! The fake rasterizer treats a "PDF" as a text file containing `pages=N`;
//! anything else is unreadable. The fake recognizer returns scripted text
//! and words, and can be told to fail on specific images.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use page_digitize::pipeline::render::PageVisitor;
use page_digitize::{
    rasterize_with, recognize_with, BatchConfig, BatchProgress, ItemError, OutputRecord,
    RasterizeOptions, Rasterizer, RecognizeOptions, RecognizedWord, Recognizer, Stage,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────

struct TextPdf;

impl Rasterizer for TextPdf {
    fn render_document(
        &self,
        path: &Path,
        _dpi: u32,
        visit: &mut PageVisitor<'_>,
    ) -> Result<usize, ItemError> {
        let unreadable = |detail: &str| ItemError::InputUnreadable {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        };
        let body = std::fs::read_to_string(path).map_err(|e| unreadable(&e.to_string()))?;
        let count: usize = body
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| unreadable("not a PDF"))?;

        for index in 0..count {
            let shade = (index * 40) as u8;
            visit(index, count, RgbImage::from_pixel(8, 11, Rgb([shade, shade, shade])))?;
        }
        Ok(count)
    }
}

#[derive(Default)]
struct Scripted {
    calls: AtomicUsize,
    words_fail: bool,
}

impl Recognizer for Scripted {
    fn recognize_text(&self, image: &GrayImage) -> Result<String, ItemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("PAGE {}x{}\n", image.width(), image.height()))
    }

    fn recognize_words(&self, _image: &GrayImage) -> Result<Vec<RecognizedWord>, ItemError> {
        if self.words_fail {
            return Err(ItemError::WordExtractionFailed {
                detail: "tsv unavailable".into(),
            });
        }
        Ok(vec![
            RecognizedWord::new("PAGE", 92.0),
            RecognizedWord::new("smudge", 60.0),
            RecognizedWord::new("ref", 78.0),
        ])
    }

    fn engine_label(&self) -> &str {
        "Scripted"
    }
}

#[derive(Default)]
struct Milestones(Mutex<Vec<usize>>);

impl BatchProgress for Milestones {
    fn on_pages_milestone(&self, pages_written: usize) {
        self.0.lock().unwrap().push(pages_written);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

struct Layout {
    _root: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
    log: PathBuf,
}

fn layout() -> Layout {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in");
    std::fs::create_dir(&input).unwrap();
    Layout {
        input,
        output: root.path().join("out/nested"),
        log: root.path().join("logs/errors.log"),
        _root: root,
    }
}

fn config(stage: Stage, l: &Layout, workers: usize) -> BatchConfig {
    BatchConfig::builder(stage)
        .input_dir(&l.input)
        .output_dir(&l.output)
        .error_log(&l.log)
        .workers(workers)
        .build()
        .unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn read_log(l: &Layout) -> String {
    std::fs::read_to_string(&l.log).unwrap_or_default()
}

fn save_png(path: &Path, w: u32, h: u32) {
    GrayImage::from_pixel(w, h, Luma([200])).save(path).unwrap();
}

fn load_record(path: &Path) -> OutputRecord {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ── Rasterize ────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_page_document_yields_numbered_pngs() {
    let l = layout();
    std::fs::write(l.input.join("doc.pdf"), "pages=3").unwrap();

    let summary = rasterize_with(
        &config(Stage::Rasterize, &l, 4),
        &RasterizeOptions::default(),
        Arc::new(TextPdf),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_clean());
    assert_eq!(
        file_names(&l.output),
        vec!["doc_page_0001.png", "doc_page_0002.png", "doc_page_0003.png"]
    );
    let page = image::open(l.output.join("doc_page_0003.png")).unwrap();
    assert_eq!((page.width(), page.height()), (8, 11));
}

#[tokio::test]
async fn corrupt_pdf_is_contained_to_one_report() {
    let l = layout();
    for (name, body) in [
        ("a.pdf", "pages=1"),
        ("b.pdf", "%PDF-1.4 truncated"),
        ("c.pdf", "pages=2"),
        ("notes.txt", "pages=9"),
        (".hidden.pdf", "pages=5"),
    ] {
        std::fs::write(l.input.join(name), body).unwrap();
    }

    let summary = rasterize_with(
        &config(Stage::Rasterize, &l, 2),
        &RasterizeOptions::default(),
        Arc::new(TextPdf),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        file_names(&l.output),
        vec!["a_page_0001.png", "c_page_0001.png", "c_page_0002.png"]
    );

    let log = read_log(&l);
    assert_eq!(log.matches("[ERROR]").count(), 1, "log: {log}");
    assert!(log.contains("b.pdf: unreadable input"), "log: {log}");
}

#[tokio::test]
async fn page_milestones_fire_on_interval_multiples() {
    let l = layout();
    std::fs::write(l.input.join("only.pdf"), "pages=5").unwrap();
    let milestones = Arc::new(Milestones::default());

    let options = RasterizeOptions {
        progress_interval: 2,
        ..Default::default()
    };
    rasterize_with(
        &config(Stage::Rasterize, &l, 1),
        &options,
        Arc::new(TextPdf),
        Some(milestones.clone()),
    )
    .await
    .unwrap();

    // A single document on a single worker is fully deterministic.
    assert_eq!(*milestones.0.lock().unwrap(), vec![2, 4]);
}

#[tokio::test]
async fn missing_input_directory_is_an_empty_batch() {
    let l = layout();
    let config = BatchConfig::builder(Stage::Rasterize)
        .input_dir(l.input.join("absent"))
        .output_dir(&l.output)
        .error_log(&l.log)
        .build()
        .unwrap();

    let summary = rasterize_with(&config, &RasterizeOptions::default(), Arc::new(TextPdf), None)
        .await
        .unwrap();

    assert_eq!(summary.discovered, 0);
    assert!(l.output.is_dir(), "output directory is still created");
    assert!(file_names(&l.output).is_empty());
}

#[tokio::test]
async fn uncreatable_output_directory_is_fatal() {
    let l = layout();
    std::fs::write(l.input.join("doc.pdf"), "pages=1").unwrap();
    let blocker = l.input.parent().unwrap().join("blocker");
    std::fs::write(&blocker, "file, not a directory").unwrap();

    let config = BatchConfig::builder(Stage::Rasterize)
        .input_dir(&l.input)
        .output_dir(blocker.join("out"))
        .error_log(&l.log)
        .build()
        .unwrap();

    let err = rasterize_with(&config, &RasterizeOptions::default(), Arc::new(TextPdf), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        page_digitize::DigitizeError::OutputDirectory { .. }
    ));
}

// ── Recognize ────────────────────────────────────────────────────────────

#[tokio::test]
async fn every_image_gets_a_record_with_filtered_confidence() {
    let l = layout();
    save_png(&l.input.join("doc_page_0002.png"), 40, 40);
    save_png(&l.input.join("doc_page_0001.png"), 10, 12);
    image::DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])))
        .save(l.input.join("cover.JPG"))
        .unwrap();
    save_png(&l.input.join(".thumb.png"), 40, 40);

    let recognizer = Arc::new(Scripted::default());
    let summary = recognize_with(
        &config(Stage::Recognize, &l, 3),
        &RecognizeOptions::default(),
        recognizer.clone(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        file_names(&l.output),
        vec!["cover.json", "doc_page_0001.json", "doc_page_0002.json"]
    );

    // Sequence numbers follow name order: cover, page 1, page 2.
    let small = load_record(&l.output.join("doc_page_0001.json"));
    assert_eq!(small.filename, "doc_page_0001.png");
    assert_eq!(small.metadata.page_number, 2);
    assert_eq!(small.metadata.dimensions, [32, 32]);
    assert_eq!(small.text, "PAGE 32x32");
    assert_eq!(small.metadata.text_blocks, 2);
    // (0.92 + 0.78) / 2
    assert_eq!(small.metadata.confidence, 0.85);
    assert_eq!(small.metadata.ocr_engine, "Scripted");

    let cover = load_record(&l.output.join("cover.json"));
    assert_eq!(cover.metadata.page_number, 1);
    assert_eq!(cover.metadata.dimensions, [50, 50]);
    assert!(read_log(&l).is_empty());
}

#[tokio::test]
async fn corrupt_image_fails_alone() {
    let l = layout();
    let names = ["p1.png", "p2.png", "p3.png", "p4.png", "p5.png"];
    for name in names {
        save_png(&l.input.join(name), 64, 64);
    }
    std::fs::write(l.input.join("p3.png"), b"\x89PNG\r\n\x1a\ngarbage").unwrap();

    let summary = recognize_with(
        &config(Stage::Recognize, &l, 4),
        &RecognizeOptions::default(),
        Arc::new(Scripted::default()),
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    let written: HashSet<String> = file_names(&l.output).into_iter().collect();
    assert_eq!(written.len(), 4);
    assert!(!written.contains("p3.json"));

    let log = read_log(&l);
    assert_eq!(log.matches("[ERROR]").count(), 1, "log: {log}");
    assert!(log.contains("p3.png"), "log: {log}");
}

#[tokio::test]
async fn word_failure_still_writes_the_record() {
    let l = layout();
    save_png(&l.input.join("faint.png"), 64, 64);

    let recognizer = Arc::new(Scripted {
        words_fail: true,
        ..Default::default()
    });
    let summary = recognize_with(
        &config(Stage::Recognize, &l, 1),
        &RecognizeOptions::default(),
        recognizer,
        None,
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 1);
    let record = load_record(&l.output.join("faint.json"));
    assert_eq!(record.text, "PAGE 64x64");
    assert_eq!(record.metadata.confidence, 0.0);
    assert_eq!(record.metadata.text_blocks, 0);

    let log = read_log(&l);
    assert!(log.contains("faint.png: word-level recognition failed: tsv unavailable"));
}

#[tokio::test]
async fn rerun_appends_to_the_error_log() {
    let l = layout();
    std::fs::write(l.input.join("broken.png"), b"not an image").unwrap();
    let cfg = config(Stage::Recognize, &l, 2);

    for _ in 0..2 {
        recognize_with(
            &cfg,
            &RecognizeOptions::default(),
            Arc::new(Scripted::default()),
            None,
        )
        .await
        .unwrap();
    }

    assert_eq!(read_log(&l).matches("[ERROR] broken.png:").count(), 2);
}

#[tokio::test]
async fn stage_and_config_must_agree() {
    let l = layout();
    let err = recognize_with(
        &config(Stage::Rasterize, &l, 1),
        &RecognizeOptions::default(),
        Arc::new(Scripted::default()),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, page_digitize::DigitizeError::InvalidConfig(_)));
    assert!(!l.output.exists(), "nothing is created for a rejected run");
}

#[test]
fn preprocessing_is_idempotent_on_binary_pages() {
    use page_digitize::pipeline::preprocess::preprocess;

    let page = DynamicImage::ImageLuma8(GrayImage::from_fn(48, 48, |x, y| {
        Luma([if (x / 6 + y / 6) % 2 == 0 { 0 } else { 255 }])
    }));
    let once = preprocess(&page, 1.5);
    let twice = preprocess(&DynamicImage::ImageLuma8(once.clone()), 1.5);
    assert!(once.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    assert_eq!(once, twice);
}
