//! Configuration types for a triage run.
//!
//! All behaviour is controlled through [`TriageConfig`], built via its
//! [`TriageConfigBuilder`]. Loading the instruction text and reading the
//! environment are the caller's job; this module only validates what it is
//! given.

use crate::error::TriageError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a batch triage run.
///
/// # Example
/// ```rust
/// use pdf_triage::TriageConfig;
///
/// let config = TriageConfig::builder()
///     .instructions("Classify the document type.")
///     .max_pages(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 10);
/// ```
#[derive(Clone)]
pub struct TriageConfig {
    /// System instructions sent verbatim as the prompt preamble. Required.
    pub instructions: String,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`] is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Documents with more pages than this are rejected before extraction. Default: 5.
    pub max_pages: usize,

    /// A page whose native text has fewer trimmed characters than this is
    /// re-read with the layout-aware extractor. Default: 30.
    pub native_min_chars: usize,

    /// A page whose best text after the layout stage is still shorter than
    /// this is rasterised and OCR'd. Default: 20.
    pub ocr_min_chars: usize,

    /// Attempts per classification call before the service is declared
    /// unavailable. Default: 3.
    pub max_retries: u32,

    /// Base backoff delay in milliseconds. Attempt `n` (0-based) that fails
    /// waits `retry_delay_ms * 2^n` before the next one. Default: 2000.
    pub retry_delay_ms: u64,

    /// Repair rounds after an unparsable reply. Default: 2.
    pub max_json_retries: u32,

    /// Sampling temperature for the completion. Default: 0.0.
    pub temperature: f32,

    /// Maximum completion tokens per call. Default: 1024.
    pub max_tokens: usize,

    /// Per-call timeout in seconds; a timeout counts as a failed attempt. Default: 60.
    pub api_timeout_secs: u64,

    /// Tesseract language pack(s). Default: "spa".
    pub ocr_language: String,

    /// Rasterisation DPI for the OCR stage. Default: 300.
    pub ocr_dpi: u32,

    /// Pretty-print output records. Default: true.
    pub pretty_print: bool,

    /// Optional per-document progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            model: None,
            provider_name: None,
            provider: None,
            max_pages: 5,
            native_min_chars: 30,
            ocr_min_chars: 20,
            max_retries: 3,
            retry_delay_ms: 2000,
            max_json_retries: 2,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
            ocr_language: "spa".to_string(),
            ocr_dpi: 300,
            pretty_print: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TriageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageConfig")
            .field("instructions_len", &self.instructions.len())
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_pages", &self.max_pages)
            .field("native_min_chars", &self.native_min_chars)
            .field("ocr_min_chars", &self.ocr_min_chars)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_json_retries", &self.max_json_retries)
            .field("ocr_language", &self.ocr_language)
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

impl TriageConfig {
    /// Create a new builder for `TriageConfig`.
    pub fn builder() -> TriageConfigBuilder {
        TriageConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`TriageConfig`].
pub struct TriageConfigBuilder {
    config: TriageConfig,
}

impl TriageConfigBuilder {
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = text.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn native_min_chars(mut self, n: usize) -> Self {
        self.config.native_min_chars = n;
        self
    }

    pub fn ocr_min_chars(mut self, n: usize) -> Self {
        self.config.ocr_min_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn max_json_retries(mut self, n: u32) -> Self {
        self.config.max_json_retries = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn pretty_print(mut self, v: bool) -> Self {
        self.config.pretty_print = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TriageConfig, TriageError> {
        let c = &self.config;
        if c.instructions.trim().is_empty() {
            return Err(TriageError::InvalidConfig(
                "Instructions must not be empty".into(),
            ));
        }
        if c.max_pages == 0 {
            return Err(TriageError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.max_retries == 0 {
            return Err(TriageError::InvalidConfig(
                "max_retries must be ≥ 1 (it counts attempts)".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(TriageError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Read the instruction text used as the prompt preamble.
pub fn load_instructions(path: impl AsRef<Path>) -> Result<String, TriageError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TriageError::InstructionsNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| TriageError::InstructionsUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = TriageConfig::default();
        assert_eq!(c.max_pages, 5);
        assert_eq!(c.native_min_chars, 30);
        assert_eq!(c.ocr_min_chars, 20);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_delay_ms, 2000);
        assert_eq!(c.max_json_retries, 2);
        assert!(c.pretty_print);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn build_requires_instructions() {
        let err = TriageConfig::builder().build().unwrap_err();
        assert!(matches!(err, TriageError::InvalidConfig(_)));

        let err = TriageConfig::builder().instructions("   ").build().unwrap_err();
        assert!(matches!(err, TriageError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let err = TriageConfig::builder()
            .instructions("x")
            .max_retries(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn builder_clamps_dpi_and_temperature() {
        let c = TriageConfig::builder()
            .instructions("x")
            .ocr_dpi(10_000)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.ocr_dpi, 600);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn load_instructions_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_instructions(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, TriageError::InstructionsNotFound { .. }));
    }

    #[test]
    fn load_instructions_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt_instructions.txt");
        std::fs::write(&path, "Label the document.").unwrap();
        assert_eq!(load_instructions(&path).unwrap(), "Label the document.");
    }
}
