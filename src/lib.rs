//! # pdf-triage
//!
//! Extract the best available text from every PDF in a directory and
//! classify each document with an LLM into a JSON object of labels.
//!
//! ## Why this crate?
//!
//! Real document batches mix born-digital PDFs, multi-column layouts and
//! scans. No single extractor handles all three, and the expensive one
//! (OCR) should only run where the cheap ones came up empty. The
//! classification step has the opposite problem: models sometimes wrap
//! their JSON in chatter or fences, or break it outright. This crate
//! escalates extraction page by page and repairs model output in a bounded
//! loop, emitting one self-contained record per document as it goes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory
//!  │
//!  ├─ 1. Discover  *.pdf (case-insensitive), sorted by name
//!  ├─ 2. Inspect   page count + embedded images (lopdf); enforce page limit
//!  ├─ 3. Extract   native text → layout-aware text → raster OCR, per page
//!  ├─ 4. Classify  instructions + text → JSON labels (retry, backoff, repair)
//!  └─ 5. Emit      one JSON record per document, streamed immediately
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_triage::{triage_directory, JsonLinesSink, TriageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = TriageConfig::builder()
//!         .instructions(pdf_triage::load_instructions("instructions.txt")?)
//!         .build()?;
//!     let mut sink = JsonLinesSink::stdout(config.pretty_print);
//!     let summary = triage_directory("./inbox", config, &mut sink).await?;
//!     eprintln!("{} ok, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-triage` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! ## Optional native capabilities
//!
//! OCR needs the pdfium shared library (`PDFIUM_LIB_PATH`, the working
//! directory, or the system path) and a `tesseract` binary with the
//! configured language pack. Without them the OCR stage is skipped with a
//! single warning and scanned pages stay empty.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{load_instructions, TriageConfig, TriageConfigBuilder, DEFAULT_MODEL};
pub use error::{DocumentError, ErrorCode, TriageError};
pub use output::{
    BatchSummary, ClassificationLabels, ClassificationResult, DocumentMetadata, ExtractionSummary,
    PipelineRecord, RecordStatus, TokenUsage,
};
pub use pipeline::cascade::{ExtractedDocument, ExtractionCascade, PageText};
pub use pipeline::classify::{ClassificationEngine, ClassifyError};
pub use pipeline::input::RawDocument;
pub use pipeline::llm::{
    BackendError, ChatBackend, ChatReply, ChatRole, ChatTurn, EdgequakeBackend,
    ResilientChatClient, RetryPolicy, ServiceUnavailable,
};
pub use pipeline::sources::{OriginStage, SourceError, TextSource};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use run::{resolve_provider, triage_directory, DocumentPipeline};
pub use stream::{JsonLinesSink, RecordSink};
