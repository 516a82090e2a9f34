//! Per-item pipeline stages used by the two batch processors.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the engines can be swapped (or faked) without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! rasterize:  input ──▶ render ──▶ encode (PNG per page)
//! recognize:  input ──▶ preprocess ──▶ ocr ──▶ encode (JSON per image)
//! ```
//!
//! 1. [`input`]      — scan a directory for work items
//! 2. [`render`]     — rasterise PDF pages via pdfium
//! 3. [`preprocess`] — pad, grayscale, contrast, denoise, binarize
//! 4. [`ocr`]        — run tesseract and filter words by confidence
//! 5. [`encode`]     — write PNG/JSON artifacts atomically

pub mod encode;
pub mod input;
pub mod ocr;
pub mod preprocess;
pub mod render;
