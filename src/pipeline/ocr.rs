//! Optical character recognition: the last-resort text source.
//!
//! [`RasterOcrSource`] composes a [`Rasterizer`] with an [`OcrEngine`].
//! The default engine shells out to the `tesseract` binary; a missing
//! binary is reported as [`SourceError::Unavailable`], the same way a
//! missing pdfium library is.

use crate::pipeline::input::RawDocument;
use crate::pipeline::render::Rasterizer;
use crate::pipeline::sources::{OriginStage, SourceError, TextSource};
use image::DynamicImage;
use std::io::ErrorKind;
use std::process::Command;
use tracing::{debug, error};

/// Turns one page image into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, SourceError>;
}

/// Tesseract via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    language: String,
}

impl TesseractCli {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: language.into(),
        }
    }

    /// Use a specific tesseract executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<String, SourceError> {
        let failed = |detail: String| SourceError::Failed {
            stage: OriginStage::Ocr,
            detail,
        };

        let mut png = tempfile::Builder::new()
            .prefix("pdf-triage-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| failed(format!("temp file: {e}")))?;
        image
            .write_to(png.as_file_mut(), image::ImageFormat::Png)
            .map_err(|e| failed(format!("PNG encode: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(png.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    SourceError::Unavailable {
                        capability: "tesseract",
                        detail: format!("'{}' not found on PATH", self.binary),
                    }
                } else {
                    failed(format!("spawn {}: {e}", self.binary))
                }
            })?;

        if !output.status.success() {
            return Err(failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract recognised {} chars", text.len());
        Ok(text)
    }
}

/// Rasterise pages and OCR each image.
pub struct RasterOcrSource {
    rasterizer: Box<dyn Rasterizer>,
    engine: Box<dyn OcrEngine>,
}

impl RasterOcrSource {
    pub fn new(rasterizer: impl Rasterizer + 'static, engine: impl OcrEngine + 'static) -> Self {
        Self {
            rasterizer: Box::new(rasterizer),
            engine: Box::new(engine),
        }
    }
}

impl TextSource for RasterOcrSource {
    fn stage(&self) -> OriginStage {
        OriginStage::Ocr
    }

    fn extract(&self, doc: &RawDocument, pages: &[usize]) -> Result<Vec<String>, SourceError> {
        let images = self.rasterizer.rasterize(doc, pages)?;

        let mut texts = Vec::with_capacity(images.len().max(pages.len()));
        for (i, image) in images.iter().enumerate() {
            let text = match image {
                None => String::new(),
                Some(img) => match self.engine.recognize(img) {
                    Ok(text) => text,
                    Err(e @ SourceError::Unavailable { .. }) => return Err(e),
                    Err(e) => {
                        match pages.get(i) {
                            Some(idx) => error!("{}: OCR failed on page {}: {}", doc.name(), idx + 1, e),
                            None => error!("{}: OCR failed on surplus image: {}", doc.name(), e),
                        }
                        String::new()
                    }
                },
            };
            texts.push(text);
        }

        // Fewer images than requested pages: the tail pages get nothing.
        if texts.len() < pages.len() {
            texts.resize(pages.len(), String::new());
        }
        Ok(texts)
    }
}
