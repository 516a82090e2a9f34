//! PDF rasterisation behind the [`Rasterizer`] capability trait.
//!
//! The batch engine only needs two things from a PDF library: how many pages
//! a document has, and an RGB bitmap of page *n* at a given DPI. Keeping
//! that behind a trait lets the orchestrator and item processors be tested
//! against an in-memory fake without linking pdfium.
//!
//! ## Why bind per document?
//!
//! A `PdfDocument` borrows the `Pdfium` instance that opened it, and pdfium
//! itself keeps thread-local state. Each call to
//! [`PdfiumRasterizer::render_document`] therefore binds its own `Pdfium` on
//! the worker thread it runs on; with the `thread_safe` feature enabled
//! pdfium-render serialises the underlying FFI calls.

use crate::error::{DigitizeError, ItemError};
use image::RgbImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Receives each rendered page: `(page_index_0based, page_count, bitmap)`.
pub type PageVisitor<'a> = dyn FnMut(usize, usize, RgbImage) -> Result<(), ItemError> + 'a;

/// A PDF rendering capability.
pub trait Rasterizer: Send + Sync {
    /// Open `path`, then render every page in order at `dpi` and hand it to
    /// `visit`. Stops at the first error, from the engine or from `visit`.
    ///
    /// Returns the number of pages rendered.
    fn render_document(
        &self,
        path: &Path,
        dpi: u32,
        visit: &mut PageVisitor<'_>,
    ) -> Result<usize, ItemError>;
}

/// [`Rasterizer`] backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Verify pdfium can be bound, failing fast before any item is dispatched.
    ///
    /// `library_dir` is the directory containing libpdfium; `None` tries the
    /// working directory and then the system library search path.
    pub fn new(library_dir: Option<PathBuf>) -> Result<Self, DigitizeError> {
        let rasterizer = Self { library_dir };
        rasterizer.bind()?;
        info!("PDF engine bound");
        Ok(rasterizer)
    }

    fn bind(&self) -> Result<Pdfium, DigitizeError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DigitizeError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn render_document(
        &self,
        path: &Path,
        dpi: u32,
        visit: &mut PageVisitor<'_>,
    ) -> Result<usize, ItemError> {
        let pdfium = self
            .bind()
            .map_err(|e| ItemError::EngineUnavailable(e.to_string()))?;

        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ItemError::InputUnreadable {
                    path: path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        debug!("{}: {} pages", path.display(), page_count);

        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        for index in 0..page_count {
            let page = pages
                .get(index as u16)
                .map_err(|e| ItemError::RenderFailed {
                    page: index + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap =
                page.render_with_config(&render_config)
                    .map_err(|e| ItemError::RenderFailed {
                        page: index + 1,
                        detail: format!("{:?}", e),
                    })?;

            let image = bitmap.as_image().to_rgb8();
            debug!(
                "Rendered page {} → {}x{} px",
                index + 1,
                image.width(),
                image.height()
            );
            visit(index, page_count, image)?;
        }

        Ok(page_count)
    }
}

/// Output file name for page `page_number` (1-based) of `stem`.
pub fn page_file_name(stem: &str, page_number: usize) -> String {
    format!("{stem}_page_{page_number:04}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_are_one_based_and_zero_padded() {
        let names: Vec<_> = (1..=3).map(|n| page_file_name("doc", n)).collect();
        assert_eq!(
            names,
            vec!["doc_page_0001.png", "doc_page_0002.png", "doc_page_0003.png"]
        );
        assert_eq!(page_file_name("x", 12345), "x_page_12345.png");
    }

    #[test]
    fn missing_library_dir_fails_to_bind() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfiumRasterizer::new(Some(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, DigitizeError::PdfiumBindingFailed(_)));
    }

    #[test]
    fn bind_failure_on_worker_is_not_a_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = PdfiumRasterizer {
            library_dir: Some(dir.path().to_path_buf()),
        };
        let mut pages = 0;
        let err = rasterizer
            .render_document(&dir.path().join("doc.pdf"), 300, &mut |_: usize, _: usize, _: RgbImage| {
                pages += 1;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ItemError::EngineUnavailable(_)), "got: {err:?}");
        assert!(err.to_string().starts_with("PDF engine unavailable"));
        assert_eq!(pages, 0);
    }
}
