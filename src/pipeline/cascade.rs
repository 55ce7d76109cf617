//! The extraction cascade: native text, then layout-aware text, then OCR.
//!
//! Every page starts with whatever the native source gives it. Pages whose
//! text is still below `native_min_chars` are re-read by the layout source;
//! pages still below `ocr_min_chars` after that are rasterised and OCR'd.
//! A stage only runs on pages the previous stages left below threshold, and
//! whatever non-empty text it returns for such a page replaces the earlier
//! text. A stage that yields nothing for a page leaves it untouched.
//!
//! Stage failures are never fatal to the document. The worst outcome is an
//! empty string, which the classifier still receives.
//!
//! The first time the OCR source reports a missing capability the cascade
//! logs a single warning and skips OCR for the rest of its lifetime.

use crate::config::TriageConfig;
use crate::output::ExtractionSummary;
use crate::pipeline::input::RawDocument;
use crate::pipeline::normalize::{meaningful_len, normalise_page_text};
use crate::pipeline::ocr::{RasterOcrSource, TesseractCli};
use crate::pipeline::render::PdfiumRasterizer;
use crate::pipeline::sources::{
    LayoutTextSource, NativeTextSource, OriginStage, SourceError, TextSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Final text of one page and the stage that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 0-based page index.
    pub index: usize,
    pub text: String,
    pub origin: OriginStage,
}

/// Everything the cascade recovered from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
    /// OCR output for images beyond the requested pages.
    pub surplus: Vec<String>,
    /// Non-empty page texts in page order, then surplus text, joined by newlines.
    pub text: String,
}

impl ExtractedDocument {
    fn assemble(pages: Vec<PageText>, surplus: Vec<String>) -> Self {
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .chain(surplus.iter().map(String::as_str))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            pages,
            surplus,
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Per-stage page counts for the output record.
    pub fn summary(&self) -> ExtractionSummary {
        let mut summary = ExtractionSummary {
            surplus_images: self.surplus.len(),
            chars: self.text.chars().count(),
            ..Default::default()
        };
        for page in &self.pages {
            match page.origin {
                OriginStage::Native => summary.native_pages += 1,
                OriginStage::Layout => summary.layout_pages += 1,
                OriginStage::Ocr => summary.ocr_pages += 1,
                OriginStage::None => summary.empty_pages += 1,
            }
        }
        summary
    }
}

/// Three-stage page text extraction.
///
/// Synchronous and CPU/subprocess-bound; async callers run it on the
/// blocking pool.
pub struct ExtractionCascade {
    native: Box<dyn TextSource>,
    layout: Box<dyn TextSource>,
    ocr: Box<dyn TextSource>,
    native_min_chars: usize,
    ocr_min_chars: usize,
    ocr_omitted: AtomicBool,
}

impl ExtractionCascade {
    pub fn new(
        native: impl TextSource + 'static,
        layout: impl TextSource + 'static,
        ocr: impl TextSource + 'static,
    ) -> Self {
        let defaults = TriageConfig::default();
        Self {
            native: Box::new(native),
            layout: Box::new(layout),
            ocr: Box::new(ocr),
            native_min_chars: defaults.native_min_chars,
            ocr_min_chars: defaults.ocr_min_chars,
            ocr_omitted: AtomicBool::new(false),
        }
    }

    /// The production cascade: lopdf, pdf-extract, pdfium + tesseract.
    pub fn from_config(config: &TriageConfig) -> Self {
        let ocr = RasterOcrSource::new(
            PdfiumRasterizer::new(config.ocr_dpi),
            TesseractCli::new(config.ocr_language.clone()),
        );
        Self::new(NativeTextSource, LayoutTextSource, ocr)
            .with_thresholds(config.native_min_chars, config.ocr_min_chars)
    }

    pub fn with_thresholds(mut self, native_min_chars: usize, ocr_min_chars: usize) -> Self {
        self.native_min_chars = native_min_chars;
        self.ocr_min_chars = ocr_min_chars;
        self
    }

    /// True once OCR has been disabled for missing capabilities.
    pub fn ocr_omitted(&self) -> bool {
        self.ocr_omitted.load(Ordering::Relaxed)
    }

    /// Run all stages over `doc`. Never fails.
    pub fn extract(&self, doc: &RawDocument) -> ExtractedDocument {
        let mut pages: Vec<PageText> = (0..doc.page_count())
            .map(|index| PageText {
                index,
                text: String::new(),
                origin: OriginStage::None,
            })
            .collect();

        let all: Vec<usize> = (0..pages.len()).collect();
        self.run_stage(self.native.as_ref(), doc, &mut pages, &all);

        let weak = pages_below(&pages, self.native_min_chars);
        if !weak.is_empty() {
            debug!(
                "{}: {} page(s) below {} chars after native pass",
                doc.name(),
                weak.len(),
                self.native_min_chars
            );
            self.run_stage(self.layout.as_ref(), doc, &mut pages, &weak);
        }

        let mut surplus = Vec::new();
        let missing = pages_below(&pages, self.ocr_min_chars);
        if !missing.is_empty() {
            if self.ocr_omitted() {
                debug!(
                    "{}: OCR disabled, {} page(s) left as-is",
                    doc.name(),
                    missing.len()
                );
            } else {
                surplus = self.run_ocr(doc, &mut pages, &missing);
            }
        }

        let extracted = ExtractedDocument::assemble(pages, surplus);
        let summary = extracted.summary();
        info!(
            "{}: extracted {} chars (native={}, layout={}, ocr={}, empty={})",
            doc.name(),
            summary.chars,
            summary.native_pages,
            summary.layout_pages,
            summary.ocr_pages,
            summary.empty_pages
        );
        extracted
    }

    /// Offer a source's text for `requested` pages; surplus entries are dropped.
    fn run_stage(
        &self,
        source: &dyn TextSource,
        doc: &RawDocument,
        pages: &mut [PageText],
        requested: &[usize],
    ) {
        match source.extract(doc, requested) {
            Ok(texts) => {
                for (&idx, raw) in requested.iter().zip(texts) {
                    offer(&mut pages[idx], &raw, source.stage());
                }
            }
            Err(e) => warn!("{}: {}", doc.name(), e),
        }
    }

    fn run_ocr(
        &self,
        doc: &RawDocument,
        pages: &mut [PageText],
        requested: &[usize],
    ) -> Vec<String> {
        match self.ocr.extract(doc, requested) {
            Ok(texts) => {
                let mut texts = texts.into_iter();
                for &idx in requested {
                    match texts.next() {
                        Some(raw) => offer(&mut pages[idx], &raw, OriginStage::Ocr),
                        None => break,
                    }
                }
                let surplus: Vec<String> = texts
                    .map(|raw| normalise_page_text(&raw))
                    .filter(|t| !t.is_empty())
                    .collect();
                if !surplus.is_empty() {
                    debug!("{}: {} surplus OCR image(s)", doc.name(), surplus.len());
                }
                surplus
            }
            Err(e @ SourceError::Unavailable { .. }) => {
                if !self.ocr_omitted.swap(true, Ordering::Relaxed) {
                    warn!(
                        "OCR omitted: {}. Pages without a text layer will stay empty.",
                        e
                    );
                }
                Vec::new()
            }
            Err(e) => {
                warn!("{}: {}", doc.name(), e);
                Vec::new()
            }
        }
    }
}

fn pages_below(pages: &[PageText], min_chars: usize) -> Vec<usize> {
    pages
        .iter()
        .filter(|p| meaningful_len(&p.text) < min_chars)
        .map(|p| p.index)
        .collect()
}

fn offer(page: &mut PageText, raw: &str, stage: OriginStage) {
    let text = normalise_page_text(raw);
    if meaningful_len(&text) > 0 {
        page.text = text;
        page.origin = stage;
    }
}
