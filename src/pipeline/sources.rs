//! Text sources: the interchangeable strategies the extraction cascade
//! escalates through.
//!
//! Each source returns the text it can recover for the requested pages and
//! signals failure with a [`SourceError`] instead of
//! panicking. An empty string for a page means "no text available".
//!
//! | Source | Backend | Cost |
//! |--------|---------|------|
//! | [`NativeTextSource`] | lopdf text operators | cheap, no rendering |
//! | [`LayoutTextSource`] | pdf-extract glyph positioning | moderate, whole-document parse |
//! | [`crate::pipeline::ocr::RasterOcrSource`] | pdfium + tesseract | expensive, per-page render |

use crate::pipeline::input::RawDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// The extraction strategy that produced a page's final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginStage {
    Native,
    Layout,
    Ocr,
    /// No stage produced any text for the page.
    None,
}

impl fmt::Display for OriginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OriginStage::Native => "native",
            OriginStage::Layout => "layout",
            OriginStage::Ocr => "ocr",
            OriginStage::None => "none",
        })
    }
}

/// Why a source produced nothing at all.
///
/// Never escapes the cascade; it only decides whether the cascade warns
/// (and, for [`SourceError::Unavailable`], whether it stops asking).
#[derive(Debug, Error)]
pub enum SourceError {
    /// A required external capability (shared library, binary) is missing.
    #[error("{capability} unavailable: {detail}")]
    Unavailable {
        capability: &'static str,
        detail: String,
    },

    /// The source ran but could not handle this document.
    #[error("{stage} extraction failed: {detail}")]
    Failed { stage: OriginStage, detail: String },
}

/// One extraction strategy.
pub trait TextSource: Send + Sync {
    /// The origin stage recorded for pages this source supplies.
    fn stage(&self) -> OriginStage;

    /// Best-effort text for each requested 0-based page, in request order.
    ///
    /// The result holds at least `pages.len()` entries. Any entries beyond
    /// that are surplus output the source produced on its own; the cascade
    /// appends them after all page text.
    fn extract(&self, doc: &RawDocument, pages: &[usize]) -> Result<Vec<String>, SourceError>;
}

/// Embedded text via lopdf's content-stream text extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTextSource;

impl TextSource for NativeTextSource {
    fn stage(&self) -> OriginStage {
        OriginStage::Native
    }

    fn extract(&self, doc: &RawDocument, pages: &[usize]) -> Result<Vec<String>, SourceError> {
        let pdf = lopdf::Document::load_mem(doc.bytes()).map_err(|e| SourceError::Failed {
            stage: OriginStage::Native,
            detail: e.to_string(),
        })?;

        let texts = pages
            .iter()
            .map(|&idx| {
                let page_number = (idx + 1) as u32;
                match pdf.extract_text(&[page_number]) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("{}: no native text on page {}: {}", doc.name(), page_number, e);
                        String::new()
                    }
                }
            })
            .collect();
        Ok(texts)
    }
}

/// Layout-sensitive text via pdf-extract.
///
/// pdf-extract positions glyphs before emitting text, which recovers
/// multi-column and table content the native pass misses. It parses the
/// whole document on every call and is known to panic on some font
/// programs; panics are caught and reported as [`SourceError::Failed`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutTextSource;

impl TextSource for LayoutTextSource {
    fn stage(&self) -> OriginStage {
        OriginStage::Layout
    }

    fn extract(&self, doc: &RawDocument, pages: &[usize]) -> Result<Vec<String>, SourceError> {
        let bytes = doc.bytes();
        let all = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| SourceError::Failed {
                stage: OriginStage::Layout,
                detail: "pdf-extract panicked while parsing".to_string(),
            })?
            .map_err(|e| SourceError::Failed {
                stage: OriginStage::Layout,
                detail: e.to_string(),
            })?;

        Ok(pages
            .iter()
            .map(|&idx| all.get(idx).cloned().unwrap_or_default())
            .collect())
    }
}
