//! CLI binary for pdf-triage.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TriageConfig`, streams records to stdout (or a file) and prints a
//! summary on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_triage::{
    load_instructions, BatchProgressCallback, BatchSummary, DocumentPipeline, JsonLinesSink,
    PipelineRecord, ProgressCallback, RecordSink, RecordStatus, TriageConfig,
};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar for the batch, one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} docs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Triaging");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_documents} PDF(s)"))
        ));
    }

    fn on_document_start(&self, _count: usize, file: &str) {
        self.bar.set_message(file.to_string());
    }

    fn on_document_complete(&self, record: &PipelineRecord) {
        let elapsed = dim(&format!("{:.1}s", record.metadata.elapsed_ms as f64 / 1000.0));
        let line = match record.status {
            RecordStatus::Ok => format!(
                "  {} {:>3}  {}  {}",
                green("✓"),
                record.count,
                record.file,
                elapsed
            ),
            RecordStatus::Error => format!(
                "  {} {:>3}  {}  {}  {}",
                red("✗"),
                record.count,
                record.file,
                red(record.error_code.map(|c| c.as_str()).unwrap_or("UNKNOWN")),
                elapsed
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify every PDF in ./inbox with the instructions in instructions.txt
  pdf-triage ./inbox

  # Custom instructions, compact one-line records into a file
  pdf-triage ./inbox --instructions rules.txt --compact -o records.jsonl

  # Allow longer documents and OCR in English
  pdf-triage ./inbox --max-pages 20 --ocr-lang eng

OUTPUT:
  One JSON record per document on stdout, each followed by a blank line.
  Logs, progress and the final summary go to stderr.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium, needed for OCR of scanned pages
  PDF_TRIAGE_*            Every flag below has an env twin

  A .env file in the working directory is loaded first.
"#;

/// Extract text from PDFs and classify each with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-triage",
    version,
    about = "Extract text from PDFs (native → layout → OCR) and classify each with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the PDFs to triage.
    #[arg(env = "PDF_TRIAGE_INPUT_DIR")]
    input_dir: PathBuf,

    /// Text file with the classification instructions.
    #[arg(
        short,
        long,
        env = "PDF_TRIAGE_INSTRUCTIONS",
        default_value = "instructions.txt"
    )]
    instructions: PathBuf,

    /// Write records to this file instead of stdout.
    #[arg(short, long, env = "PDF_TRIAGE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Reject documents with more pages than this.
    #[arg(long, env = "PDF_TRIAGE_MAX_PAGES", default_value_t = 5)]
    max_pages: usize,

    /// Pages with fewer native characters get the layout-aware pass.
    #[arg(long, env = "PDF_TRIAGE_NATIVE_MIN_CHARS", default_value_t = 30)]
    native_min_chars: usize,

    /// Pages still shorter than this after the layout pass are OCR'd.
    #[arg(long, env = "PDF_TRIAGE_OCR_MIN_CHARS", default_value_t = 20)]
    ocr_min_chars: usize,

    /// Attempts per LLM call before the service counts as unavailable.
    #[arg(long, env = "PDF_TRIAGE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base backoff in milliseconds (doubles after each failed attempt).
    #[arg(long, env = "PDF_TRIAGE_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Repair rounds after an unparsable reply.
    #[arg(long, env = "PDF_TRIAGE_MAX_JSON_RETRIES", default_value_t = 2)]
    max_json_retries: u32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF_TRIAGE_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF_TRIAGE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF_TRIAGE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Tesseract language pack(s), e.g. spa, eng, spa+eng.
    #[arg(long, env = "PDF_TRIAGE_OCR_LANG", default_value = "spa")]
    ocr_lang: String,

    /// Rasterisation DPI for OCR (72–600).
    #[arg(long, env = "PDF_TRIAGE_OCR_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    ocr_dpi: u32,

    /// One record per line instead of pretty-printed JSON.
    #[arg(long, env = "PDF_TRIAGE_COMPACT")]
    compact: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_TRIAGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_TRIAGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_TRIAGE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env before parsing so env twins of flags see its values.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active only warnings and errors are logged;
    // the bar provides the per-document feedback.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let pretty = config.pretty_print;

    let pipeline = DocumentPipeline::from_config(config).context("Failed to set up the LLM provider")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let mut sink: Box<dyn RecordSink> = match cli.output {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {:?}", path))?;
            Box::new(JsonLinesSink::new(BufWriter::new(file), pretty))
        }
        None => Box::new(JsonLinesSink::stdout(pretty)),
    };

    let summary = pipeline
        .run(&cli.input_dir, sink.as_mut())
        .await
        .context("Triage failed")?;

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!(
            "{}  {}/{} documents classified  {}ms",
            if summary.failed == 0 {
                green("✔")
            } else if summary.succeeded == 0 {
                red("✘")
            } else {
                cyan("⚠")
            },
            summary.succeeded,
            summary.documents,
            summary.elapsed_ms,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&summary.tokens_usage.prompt_tokens.to_string()),
            dim(&summary.tokens_usage.completion_tokens.to_string()),
        );
        if pipeline.cascade().ocr_omitted() {
            eprintln!(
                "   {}",
                dim("OCR was unavailable; scanned pages were classified without text")
            );
        }
    }

    Ok(())
}

/// Map CLI args to `TriageConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TriageConfig> {
    let instructions = load_instructions(&cli.instructions)
        .with_context(|| format!("Failed to load instructions from {:?}", cli.instructions))?;

    let mut builder = TriageConfig::builder()
        .instructions(instructions)
        .max_pages(cli.max_pages)
        .native_min_chars(cli.native_min_chars)
        .ocr_min_chars(cli.ocr_min_chars)
        .max_retries(cli.max_retries)
        .retry_delay_ms(cli.retry_delay_ms)
        .max_json_retries(cli.max_json_retries)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .ocr_language(cli.ocr_lang.clone())
        .ocr_dpi(cli.ocr_dpi)
        .pretty_print(!cli.compact);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
