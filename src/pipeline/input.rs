//! Input handling: discover PDFs in a directory and load one as a
//! [`RawDocument`].
//!
//! A `RawDocument` is parsed once with lopdf on construction so that page
//! count and embedded-image detection are known before any extraction
//! work is attempted. The page-limit check in [`crate::run`] relies on this:
//! an oversize document never reaches the cascade.

use crate::error::{DocumentError, TriageError};
use lopdf::{Document, Object};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// The PDF header may be preceded by junk; readers accept it within the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Immutable bytes of one input PDF plus the facts derived from them.
///
/// Cloning is cheap: the byte buffer is shared.
#[derive(Debug, Clone)]
pub struct RawDocument {
    name: String,
    bytes: Arc<[u8]>,
    page_count: usize,
    has_images: bool,
}

impl RawDocument {
    /// Parse `bytes` far enough to count pages and detect image XObjects.
    pub fn open(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, DocumentError> {
        let name = name.into();

        let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        if !window.windows(4).any(|w| w == b"%PDF") {
            return Err(DocumentError::CorruptPdf {
                file: name,
                detail: "missing %PDF header".to_string(),
            });
        }

        let doc = Document::load_mem(&bytes).map_err(|e| DocumentError::CorruptPdf {
            file: name.clone(),
            detail: e.to_string(),
        })?;

        let page_count = doc.get_pages().len();
        let has_images = has_image_xobjects(&doc);
        debug!(
            "Opened {}: {} pages, {} bytes, images={}",
            name,
            page_count,
            bytes.len(),
            has_images
        );

        Ok(Self {
            name,
            bytes: Arc::from(bytes),
            page_count,
            has_images,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn has_images(&self) -> bool {
        self.has_images
    }
}

/// True when any stream object in the file is an image XObject.
fn has_image_xobjects(doc: &Document) -> bool {
    doc.objects.values().any(|obj| match obj {
        Object::Stream(stream) => stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Image")
            .unwrap_or(false),
        _ => false,
    })
}

/// List the PDFs in `dir`, sorted by file name.
///
/// Matches a case-insensitive `.pdf` extension on regular files only.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, TriageError> {
    if !dir.exists() {
        return Err(TriageError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(TriageError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| TriageError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_pdf_name(p))
        .collect();

    if pdfs.is_empty() {
        return Err(TriageError::NoPdfsFound {
            path: dir.to_path_buf(),
        });
    }

    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Discovered {} PDFs in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

fn is_pdf_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Display name for a path: its file name, or the whole path as a fallback.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_counts_pages() {
        let bytes = test_pdf::build(&["one", "two", ""], false);
        let doc = RawDocument::open("three.pdf", bytes.clone()).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.size(), bytes.len() as u64);
        assert_eq!(doc.name(), "three.pdf");
        assert!(!doc.has_images());
    }

    #[test]
    fn open_detects_images() {
        let bytes = test_pdf::build(&[""], true);
        let doc = RawDocument::open("scan.pdf", bytes).unwrap();
        assert!(doc.has_images());
    }

    #[test]
    fn open_rejects_non_pdf() {
        let err = RawDocument::open("notes.pdf", b"hello world".to_vec()).unwrap_err();
        assert!(matches!(err, DocumentError::CorruptPdf { .. }));
    }

    #[test]
    fn discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "C.PDF", "c.txt", "a.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();

        let found: Vec<String> = discover_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(found, vec!["C.PDF", "a.pdf", "b.pdf"]);
    }

    #[test]
    fn discover_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_pdfs(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, TriageError::InputDirNotFound { .. }));
    }

    #[test]
    fn discover_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), b"x").unwrap();
        let err = discover_pdfs(dir.path()).unwrap_err();
        assert!(matches!(err, TriageError::NoPdfsFound { .. }));
    }
}
