//! Output types: token accounting, classification results, and the
//! per-document record streamed to the caller.

use crate::error::{DocumentError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Free-form labels returned by the model. Always a JSON object.
pub type ClassificationLabels = serde_json::Map<String, serde_json::Value>;

/// Token counts reported by the classification service.
///
/// Accumulates across the repair rounds of one document; never shared
/// between documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// Outcome of classifying one document.
///
/// Exactly one of labels / error exists by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationResult {
    Success {
        file: String,
        labels: ClassificationLabels,
        tokens_usage: TokenUsage,
    },
    Failure {
        file: String,
        error: String,
        error_code: ErrorCode,
        tokens_usage: TokenUsage,
    },
}

impl ClassificationResult {
    pub fn success(
        file: impl Into<String>,
        labels: ClassificationLabels,
        tokens_usage: TokenUsage,
    ) -> Self {
        ClassificationResult::Success {
            file: file.into(),
            labels,
            tokens_usage,
        }
    }

    pub fn failure(file: impl Into<String>, error: &DocumentError, tokens_usage: TokenUsage) -> Self {
        ClassificationResult::Failure {
            file: file.into(),
            error: error.to_string(),
            error_code: error.code(),
            tokens_usage,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            ClassificationResult::Success { file, .. } | ClassificationResult::Failure { file, .. } => {
                file
            }
        }
    }

    pub fn labels(&self) -> Option<&ClassificationLabels> {
        match self {
            ClassificationResult::Success { labels, .. } => Some(labels),
            ClassificationResult::Failure { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ClassificationResult::Success { .. } => None,
            ClassificationResult::Failure { error_code, .. } => Some(*error_code),
        }
    }

    pub fn tokens_usage(&self) -> TokenUsage {
        match self {
            ClassificationResult::Success { tokens_usage, .. }
            | ClassificationResult::Failure { tokens_usage, .. } => *tokens_usage,
        }
    }
}

/// How many pages each extraction stage ended up supplying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub native_pages: usize,
    pub layout_pages: usize,
    pub ocr_pages: usize,
    pub empty_pages: usize,
    /// OCR images beyond the document's page count.
    pub surplus_images: usize,
    /// Characters in the final extracted text.
    pub chars: usize,
}

/// Facts about the input file gathered while processing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub size_bytes: u64,
    /// `None` when the file could not be parsed far enough to count pages.
    pub page_count: Option<usize>,
    pub has_images: bool,
    /// Wall-clock time for the whole document, read to record.
    pub elapsed_ms: u64,
    /// Absent when extraction never ran (read failure, page limit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionSummary>,
}

/// Record status, derived from the classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::Error => "error",
        }
    }
}

/// One self-contained output record per input document.
///
/// Created once, emitted immediately, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    /// 1-based sequence number in processing order.
    pub count: usize,
    pub file: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub metadata: DocumentMetadata,
    pub result: ClassificationResult,
}

impl PipelineRecord {
    /// Assemble a record; status and error code come from `result`.
    pub fn new(count: usize, metadata: DocumentMetadata, result: ClassificationResult) -> Self {
        let error_code = result.error_code();
        let status = if error_code.is_some() {
            RecordStatus::Error
        } else {
            RecordStatus::Ok
        };
        Self {
            count,
            file: result.file().to_string(),
            status,
            error_code,
            metadata,
            result,
        }
    }
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub tokens_usage: TokenUsage,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    /// Fold one emitted record into the totals.
    pub fn record(&mut self, record: &PipelineRecord) {
        self.documents += 1;
        match record.status {
            RecordStatus::Ok => self.succeeded += 1,
            RecordStatus::Error => self.failed += 1,
        }
        self.tokens_usage += record.result.tokens_usage();
    }
}
