//! Error types for the pdf-triage library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`TriageError`] — **Fatal**: the batch cannot run at all (input
//!   directory missing, no PDFs, instructions missing, provider not
//!   configured). Returned as `Err(TriageError)` from
//!   [`crate::run::DocumentPipeline::run`] before any record is emitted.
//!
//! * [`DocumentError`] — **Per document**: one file could not be sized,
//!   read, or classified. Captured inside that document's
//!   [`crate::output::PipelineRecord`]; the batch continues.
//!
//! Every [`DocumentError`] maps to exactly one [`ErrorCode`] so downstream
//! consumers can branch on a small, stable taxonomy instead of parsing
//! free-form messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-triage library.
#[derive(Debug, Error)]
pub enum TriageError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// The input path exists but is not a directory.
    #[error("Input path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// The input directory holds no `.pdf` files.
    #[error("No PDF files found in '{path}'")]
    NoPdfsFound { path: PathBuf },

    /// Could not list the input directory.
    #[error("Failed to read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Instructions ──────────────────────────────────────────────────────
    /// The instruction file does not exist.
    #[error("Instructions file not found: '{path}'")]
    InstructionsNotFound { path: PathBuf },

    /// The instruction file exists but could not be read as UTF-8 text.
    #[error("Failed to read instructions from '{path}': {source}")]
    InstructionsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output ────────────────────────────────────────────────────────────
    /// A record could not be written to the output sink.
    #[error("Failed to write record: {source}")]
    OutputWriteFailed {
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure scoped to a single document.
///
/// Stored in the document's record; the pipeline moves on to the next file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// The file could not be read from disk.
    #[error("Could not read '{file}': {detail}")]
    Unreadable { file: String, detail: String },

    /// The bytes could not be parsed far enough to count pages.
    #[error("PDF '{file}' is corrupt or unsupported: {detail}")]
    CorruptPdf { file: String, detail: String },

    /// The document has more pages than the configured maximum.
    #[error("Too many pages: '{file}' has {pages} pages (limit {max})")]
    PageLimitExceeded {
        file: String,
        pages: usize,
        max: usize,
    },

    /// The classification service failed every attempt.
    #[error("Classification service unavailable after {attempts} attempts: {detail}")]
    ServiceUnavailable { attempts: u32, detail: String },

    /// The model never produced a parsable JSON object.
    #[error("Could not obtain valid structured output after {attempts} attempts")]
    UnparsableOutput { attempts: u32 },

    /// Unexpected failure inside the pipeline (e.g. a panicked worker).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocumentError {
    /// The stable error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            DocumentError::PageLimitExceeded { .. } => ErrorCode::PageLimitExceeded,
            DocumentError::ServiceUnavailable { .. } => ErrorCode::LlmUnavailable,
            DocumentError::UnparsableOutput { .. } => ErrorCode::UnparsableOutput,
            DocumentError::Unreadable { .. } | DocumentError::CorruptPdf { .. } => {
                ErrorCode::Unknown
            }
            DocumentError::Internal(msg) => ErrorCode::from_message(msg),
        }
    }
}

/// Stable classification of a per-document failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PageLimitExceeded,
    LlmUnavailable,
    UnparsableOutput,
    Unknown,
}

impl ErrorCode {
    /// Classify an arbitrary error message.
    ///
    /// Total: any string maps to exactly one code, defaulting to
    /// [`ErrorCode::Unknown`].
    pub fn from_message(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("too many pages") || m.contains("page limit") {
            ErrorCode::PageLimitExceeded
        } else if m.contains("service unavailable") {
            ErrorCode::LlmUnavailable
        } else if m.contains("valid structured output") || m.contains("valid json") {
            ErrorCode::UnparsableOutput
        } else {
            ErrorCode::Unknown
        }
    }

    /// The wire form used in output records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PageLimitExceeded => "PAGE_LIMIT_EXCEEDED",
            ErrorCode::LlmUnavailable => "LLM_UNAVAILABLE",
            ErrorCode::UnparsableOutput => "UNPARSABLE_OUTPUT",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
