//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::TriageConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the input directory.
//!
//! Events arrive strictly in processing order: the pipeline is sequential,
//! so `on_document_start(n)` is always followed by `on_document_complete(n)`
//! before `on_document_start(n + 1)`.
//!
//! # Example
//!
//! ```rust
//! use pdf_triage::{BatchProgressCallback, PipelineRecord, TriageConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_document_complete(&self, record: &PipelineRecord) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{} {}", record.count, record.status.as_str());
//!     }
//! }
//!
//! let config = TriageConfig::builder()
//!     .instructions("Classify.")
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchSummary, PipelineRecord};
use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before the first document.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is read.
    ///
    /// # Arguments
    /// * `count` — 1-based sequence number the record will carry
    /// * `file`  — display name of the document
    fn on_document_start(&self, count: usize, file: &str) {
        let _ = (count, file);
    }

    /// Called after the document's record has been emitted.
    fn on_document_complete(&self, record: &PipelineRecord) {
        let _ = record;
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TriageConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
