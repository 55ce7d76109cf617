//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! Only the OCR stage needs pixels, and only for pages the text stages left
//! empty. Binding the pdfium shared library is treated as an optional
//! capability: when it cannot be bound the rasteriser reports
//! [`SourceError::Unavailable`] and the cascade stops asking.
//!
//! Library lookup order: `PDFIUM_LIB_PATH`, then a copy next to the working
//! directory, then the system library path.

use crate::pipeline::input::RawDocument;
use crate::pipeline::sources::{OriginStage, SourceError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Longest edge, in pixels, of any rendered page.
///
/// An A0 poster at 300 DPI would otherwise be ~10 000 × 14 000 px.
const MAX_RENDERED_PIXELS: i32 = 5000;

/// Produces page images for OCR.
pub trait Rasterizer: Send + Sync {
    /// Render the given 0-based pages in request order.
    ///
    /// `None` marks a page that failed to render. Entries beyond
    /// `pages.len()` are surplus images.
    fn rasterize(
        &self,
        doc: &RawDocument,
        pages: &[usize],
    ) -> Result<Vec<Option<DynamicImage>>, SourceError>;
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Bind to a specific pdfium shared library instead of searching.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, SourceError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| SourceError::Unavailable {
            capability: "pdfium rasteriser",
            detail: format!("{:?}", e),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        doc: &RawDocument,
        pages: &[usize],
    ) -> Result<Vec<Option<DynamicImage>>, SourceError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(doc.bytes(), None)
            .map_err(|e| SourceError::Failed {
                stage: OriginStage::Ocr,
                detail: format!("pdfium could not open document: {:?}", e),
            })?;

        let all_pages = document.pages();
        let total_pages = all_pages.len() as usize;
        info!(
            "{}: rasterising {} of {} pages at {} DPI",
            doc.name(),
            pages.len(),
            total_pages,
            self.dpi
        );

        let mut results = Vec::with_capacity(pages.len());
        for &idx in pages {
            if idx >= total_pages {
                warn!(
                    "{}: skipping page {} (out of range, total={})",
                    doc.name(),
                    idx + 1,
                    total_pages
                );
                results.push(None);
                continue;
            }

            let rendered = all_pages.get(idx as u16).and_then(|page| {
                let width_px = (page.width().value * self.dpi as f32 / 72.0).round() as i32;
                let config = PdfRenderConfig::new()
                    .set_target_width(width_px.clamp(1, MAX_RENDERED_PIXELS))
                    .set_maximum_height(MAX_RENDERED_PIXELS);
                page.render_with_config(&config).map(|bitmap| bitmap.as_image())
            });

            match rendered {
                Ok(image) => {
                    debug!(
                        "{}: rendered page {} → {}x{} px",
                        doc.name(),
                        idx + 1,
                        image.width(),
                        image.height()
                    );
                    results.push(Some(image));
                }
                Err(e) => {
                    warn!("{}: rasterisation failed for page {}: {:?}", doc.name(), idx + 1, e);
                    results.push(None);
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let rasterizer = PdfiumRasterizer::new(300).with_library_path(dir.path().join("libnope.so"));
        let bytes = crate::pipeline::input::test_pdf::build(&[""], false);
        let doc = RawDocument::open("scan.pdf", bytes).unwrap();

        let err = rasterizer.rasterize(&doc, &[0]).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }), "got {err}");
    }

    #[test]
    fn renders_requested_pages_at_dpi() {
        let bytes = crate::pipeline::input::test_pdf::build(&["one", "two"], false);
        let doc = RawDocument::open("two.pdf", bytes).unwrap();
        let rasterizer = PdfiumRasterizer::new(144);

        let images = match rasterizer.rasterize(&doc, &[1, 5]) {
            Ok(images) => images,
            Err(SourceError::Unavailable { .. }) => {
                println!("SKIP: pdfium library not found");
                return;
            }
            Err(e) => panic!("unexpected error: {e}"),
        };

        assert_eq!(images.len(), 2);
        let page = images[0].as_ref().expect("page 2 should render");
        // 595 pt wide at 144 DPI
        assert_eq!(page.width(), 1190);
        assert!(images[1].is_none());
    }
}
