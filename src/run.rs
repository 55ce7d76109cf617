//! Batch entry points: triage every PDF in a directory.
//!
//! Documents are processed strictly one after another, in file-name order.
//! Each one yields exactly one [`PipelineRecord`], which is handed to the
//! sink before the next document is read. A per-document failure is
//! recorded and the batch moves on; only setup problems and a failing sink
//! abort the run.

use crate::config::{TriageConfig, DEFAULT_MODEL};
use crate::error::{DocumentError, TriageError};
use crate::output::{
    BatchSummary, ClassificationLabels, ClassificationResult, DocumentMetadata, PipelineRecord,
    TokenUsage,
};
use crate::pipeline::cascade::ExtractionCascade;
use crate::pipeline::classify::ClassificationEngine;
use crate::pipeline::input::{discover_pdfs, display_name, RawDocument};
use crate::pipeline::llm::{ChatBackend, EdgequakeBackend, ResilientChatClient, RetryPolicy};
use crate::stream::RecordSink;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Triage every PDF in `dir`, writing records to `sink`.
///
/// The LLM provider is resolved from `config` and the environment.
///
/// # Errors
/// Returns `Err(TriageError)` only for fatal errors:
/// - Input directory missing, unreadable, or without PDFs
/// - No LLM provider could be configured
/// - The sink failed to write a record
pub async fn triage_directory<S: RecordSink + ?Sized>(
    dir: impl AsRef<Path>,
    config: TriageConfig,
    sink: &mut S,
) -> Result<BatchSummary, TriageError> {
    DocumentPipeline::from_config(config)?
        .run(dir.as_ref(), sink)
        .await
}

/// Extraction cascade plus classification engine, configured once per run.
pub struct DocumentPipeline {
    config: TriageConfig,
    cascade: Arc<ExtractionCascade>,
    engine: ClassificationEngine,
}

impl DocumentPipeline {
    /// Build a pipeline around an explicit chat backend.
    pub fn new(config: TriageConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let cascade = Arc::new(ExtractionCascade::from_config(&config));
        let client = ResilientChatClient::new(backend, RetryPolicy::from_config(&config));
        let engine = ClassificationEngine::new(client, &config.instructions, config.max_json_retries);
        Self {
            config,
            cascade,
            engine,
        }
    }

    /// Build a pipeline whose backend is the provider resolved from config
    /// and environment.
    pub fn from_config(config: TriageConfig) -> Result<Self, TriageError> {
        let provider = resolve_provider(&config)?;
        debug!(
            "Provider resolved (name={:?}, model={})",
            config.provider_name,
            config.model_or_default()
        );
        let backend = Arc::new(EdgequakeBackend::new(provider, &config));
        Ok(Self::new(config, backend))
    }

    /// Replace the extraction cascade.
    pub fn with_cascade(mut self, cascade: ExtractionCascade) -> Self {
        self.cascade = Arc::new(cascade);
        self
    }

    pub fn cascade(&self) -> &ExtractionCascade {
        &self.cascade
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Process every PDF in `dir` in file-name order.
    pub async fn run<S: RecordSink + ?Sized>(
        &self,
        dir: &Path,
        sink: &mut S,
    ) -> Result<BatchSummary, TriageError> {
        let batch_start = Instant::now();
        let pdfs = discover_pdfs(dir)?;
        let total = pdfs.len();
        info!("Found {} PDF(s) in {}", total, dir.display());

        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }

        let mut summary = BatchSummary::default();
        for (i, path) in pdfs.iter().enumerate() {
            let count = i + 1;
            let name = display_name(path);
            info!("[{}/{}] {}", count, total, name);
            if let Some(ref cb) = callback {
                cb.on_document_start(count, &name);
            }

            let (metadata, result) = self.process_document(path).await;
            let record = PipelineRecord::new(count, metadata, result);
            sink.emit(&record)
                .map_err(|source| TriageError::OutputWriteFailed { source })?;
            summary.record(&record);

            if let Some(ref cb) = callback {
                cb.on_document_complete(&record);
            }
        }

        summary.elapsed_ms = batch_start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {} document(s), {} ok, {} failed, {} tokens, {}ms",
            summary.documents,
            summary.succeeded,
            summary.failed,
            summary.tokens_usage.total_tokens,
            summary.elapsed_ms
        );
        if let Some(ref cb) = callback {
            cb.on_batch_complete(&summary);
        }
        Ok(summary)
    }

    /// Read, extract and classify one file. Never fails: every problem is
    /// folded into the returned result.
    pub async fn process_document(&self, path: &Path) -> (DocumentMetadata, ClassificationResult) {
        let start = Instant::now();
        let name = display_name(path);
        let mut metadata = DocumentMetadata::default();

        let outcome = self.triage(path, &name, &mut metadata).await;
        metadata.elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok((labels, usage)) => ClassificationResult::success(&name, labels, usage),
            Err((error, usage)) => {
                warn!("{}: {}", name, error);
                ClassificationResult::failure(&name, &error, usage)
            }
        };
        (metadata, result)
    }

    async fn triage(
        &self,
        path: &Path,
        name: &str,
        metadata: &mut DocumentMetadata,
    ) -> Result<(ClassificationLabels, TokenUsage), (DocumentError, TokenUsage)> {
        let no_tokens = TokenUsage::default();

        // ── Read ─────────────────────────────────────────────────────────
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            (
                DocumentError::Unreadable {
                    file: name.to_string(),
                    detail: e.to_string(),
                },
                no_tokens,
            )
        })?;

        // ── Open and check page limit ────────────────────────────────────
        let doc = RawDocument::open(name, bytes).map_err(|e| (e, no_tokens))?;
        metadata.size_bytes = doc.size();
        metadata.page_count = Some(doc.page_count());
        metadata.has_images = doc.has_images();

        if doc.page_count() > self.config.max_pages {
            return Err((
                DocumentError::PageLimitExceeded {
                    file: name.to_string(),
                    pages: doc.page_count(),
                    max: self.config.max_pages,
                },
                no_tokens,
            ));
        }

        // ── Extract (blocking: lopdf, pdf-extract, pdfium, tesseract) ────
        let cascade = Arc::clone(&self.cascade);
        let extracted = tokio::task::spawn_blocking(move || cascade.extract(&doc))
            .await
            .map_err(|e| {
                (
                    DocumentError::Internal(format!("extraction task failed: {e}")),
                    no_tokens,
                )
            })?;
        metadata.extraction = Some(extracted.summary());

        if extracted.is_empty() {
            warn!("{}: no text could be extracted, classifying empty content", name);
        } else {
            debug!("{}: {} chars to classify", name, extracted.text.chars().count());
        }

        // ── Classify ─────────────────────────────────────────────────────
        self.engine
            .classify(&extracted.text)
            .await
            .map(|c| (c.labels, c.usage))
            .map_err(|e| {
                let usage = e.usage();
                (DocumentError::from(e), usage)
            })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TriageError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TriageError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), API key read
///    from the provider's usual environment variable.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **`OPENAI_API_KEY`** present: OpenAI with the configured model.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &TriageConfig) -> Result<Arc<dyn LLMProvider>, TriageError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TriageError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY (default model {DEFAULT_MODEL}), ANTHROPIC_API_KEY, \
                or pass --provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
