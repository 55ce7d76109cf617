//! Pipeline stages for extracting and classifying one document.
//!
//! Each submodule implements one step. Keeping stages separate makes each
//! independently testable and lets us swap implementations (e.g. a different
//! OCR engine) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ cascade ─────────────────────────────▶ classify ──▶ record
//! (lopdf)    native ─▶ layout ─▶ render + ocr       (llm + repair)
//!            (lopdf)   (pdf-extract) (pdfium, tesseract)
//! ```
//!
//! 1. [`input`]    — discover PDFs, load bytes, count pages, detect images
//! 2. [`sources`]  — the native and layout-aware text sources
//! 3. [`render`]   — rasterise pages for OCR via pdfium
//! 4. [`ocr`]      — tesseract over rendered pages
//! 5. [`normalize`] — deterministic cleanup applied to every stage's text
//! 6. [`cascade`]  — escalate page by page through the sources
//! 7. [`llm`]      — chat backend seam with retry/backoff; the only stage
//!    with network I/O
//! 8. [`classify`] — JSON-only conversation with a bounded repair loop

pub mod cascade;
pub mod classify;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod render;
pub mod sources;
