//! Integration tests for the batch pipeline.
//!
//! Every test runs offline: PDFs are generated with lopdf into a temp
//! directory, the LLM is a scripted [`ChatBackend`], and the OCR stage is a
//! stand-in so no pdfium or tesseract install is needed.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_triage::pipeline::sources::{LayoutTextSource, NativeTextSource};
use pdf_triage::{
    BackendError, BatchProgressCallback, BatchSummary, ChatBackend, ChatReply, ChatTurn,
    DocumentPipeline, ErrorCode, ExtractionCascade, JsonLinesSink, OriginStage, PipelineRecord,
    RawDocument, RecordStatus, SourceError, TextSource, TokenUsage, TriageConfig, TriageError,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build a PDF with one page per entry; empty strings give text-less pages.
fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            vec![]
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 11.into()]),
                Operation::new("Td", vec![60.into(), 760.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            Content { operations }.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn write_pdf(dir: &Path, name: &str, pages: &[&str]) {
    std::fs::write(dir.join(name), make_pdf(pages)).unwrap();
}

/// Replays queued replies; fails every call once the queue is empty.
#[derive(Default)]
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    seen: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedLlm {
    fn replying(replies: &[&str]) -> Arc<Self> {
        let llm = Self::default();
        for r in replies {
            llm.replies.lock().unwrap().push_back(Ok(r.to_string()));
        }
        Arc::new(llm)
    }

    fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn user_messages(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|c| c[1].content.clone())
            .collect()
    }
}

#[async_trait]
impl ChatBackend for ScriptedLlm {
    async fn complete(&self, messages: &[ChatTurn]) -> Result<ChatReply, BackendError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(ChatReply {
                content,
                usage: TokenUsage::new(100, 10),
            }),
            Some(Err(e)) => Err(BackendError::Provider(e)),
            None => Err(BackendError::Provider("503 Service Unavailable".into())),
        }
    }
}

/// OCR stand-in whose capability is missing; counts how often it is asked.
#[derive(Clone, Default)]
struct MissingOcr {
    calls: Arc<AtomicUsize>,
}

impl TextSource for MissingOcr {
    fn stage(&self) -> OriginStage {
        OriginStage::Ocr
    }

    fn extract(&self, _doc: &RawDocument, _pages: &[usize]) -> Result<Vec<String>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Unavailable {
            capability: "pdfium rasteriser",
            detail: "not installed".into(),
        })
    }
}

fn config(max_pages: usize) -> TriageConfig {
    TriageConfig::builder()
        .instructions("Clasifica el documento. Devuelve {\"tipo\": ...}.")
        .max_pages(max_pages)
        .retry_delay_ms(50)
        .build()
        .unwrap()
}

fn pipeline(config: TriageConfig, llm: Arc<ScriptedLlm>, ocr: MissingOcr) -> DocumentPipeline {
    DocumentPipeline::new(config, llm).with_cascade(ExtractionCascade::new(
        NativeTextSource,
        LayoutTextSource,
        ocr,
    ))
}

fn parse_records(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .split("\n\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| serde_json::from_str(chunk).unwrap())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn one_record_per_document_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "03_contrato.pdf", &["Contrato de arrendamiento entre las partes"]);
    write_pdf(dir.path(), "01_factura.PDF", &["Factura numero 2024-0042 total 1.210 EUR"]);
    std::fs::write(dir.path().join("02_roto.pdf"), b"%PDF-1.4\ngarbage").unwrap();
    write_pdf(dir.path(), "04_largo.pdf", &["pagina"; 7]);
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let llm = ScriptedLlm::replying(&[r#"{"tipo": "factura"}"#, r#"{"tipo": "contrato"}"#]);
    let mut sink = JsonLinesSink::new(Vec::new(), true);
    let summary = pipeline(config(5), llm.clone(), MissingOcr::default())
        .run(dir.path(), &mut sink)
        .await
        .unwrap();

    let records = parse_records(&sink.into_inner());
    assert_eq!(records.len(), 4);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(r["count"], json!(i + 1));
    }

    let files: Vec<&str> = records.iter().map(|r| r["file"].as_str().unwrap()).collect();
    assert_eq!(
        files,
        vec!["01_factura.PDF", "02_roto.pdf", "03_contrato.pdf", "04_largo.pdf"]
    );

    assert_eq!(records[0]["status"], json!("ok"));
    assert_eq!(records[0]["result"]["labels"], json!({"tipo": "factura"}));
    assert_eq!(records[1]["status"], json!("error"));
    assert_eq!(records[1]["error_code"], json!("UNKNOWN"));
    assert_eq!(records[2]["result"]["labels"]["tipo"], json!("contrato"));
    assert_eq!(records[3]["error_code"], json!("PAGE_LIMIT_EXCEEDED"));

    assert_eq!(summary.documents, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.tokens_usage, TokenUsage::new(200, 20));
    assert_eq!(llm.calls(), 2);
    assert!(llm.user_messages()[0].contains("Factura numero 2024-0042"));
}

#[tokio::test(start_paused = true)]
async fn page_limit_short_circuits_extraction_and_classification() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "siete.pdf", &["", "", "", "", "", "", ""]);

    let llm = ScriptedLlm::replying(&[r#"{"tipo": "x"}"#]);
    let ocr = MissingOcr::default();
    let mut records: Vec<PipelineRecord> = Vec::new();
    pipeline(config(5), llm.clone(), ocr.clone())
        .run(dir.path(), &mut records)
        .await
        .unwrap();

    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Error);
    assert_eq!(record.error_code, Some(ErrorCode::PageLimitExceeded));
    assert_eq!(record.metadata.page_count, Some(7));
    assert!(record.metadata.extraction.is_none());
    assert_eq!(llm.calls(), 0);
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unavailable_service_is_recorded_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "a.pdf", &["Documento con texto suficiente para clasificar"]);
    write_pdf(dir.path(), "b.pdf", &["Otro documento con texto suficiente tambien"]);

    let llm = ScriptedLlm::down();
    let mut records: Vec<PipelineRecord> = Vec::new();
    let summary = pipeline(config(5), llm.clone(), MissingOcr::default())
        .run(dir.path(), &mut records)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.error_code, Some(ErrorCode::LlmUnavailable));
        assert!(record.result.tokens_usage().is_zero());
        assert!(record.result.labels().is_none());
    }
    assert_eq!(summary.failed, 2);
    // Three attempts per document.
    assert_eq!(llm.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn chatty_reply_is_accepted_without_repair() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "f.pdf", &["Factura simplificada numero 77 del comercio"]);

    let llm = ScriptedLlm::replying(&["Sure! {\"tipo\": \"factura\"}"]);
    let mut records: Vec<PipelineRecord> = Vec::new();
    pipeline(config(5), llm.clone(), MissingOcr::default())
        .run(dir.path(), &mut records)
        .await
        .unwrap();

    assert_eq!(records[0].result.labels().unwrap()["tipo"], json!("factura"));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unparsable_replies_exhaust_the_repair_budget() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "f.pdf", &["Texto de un documento cualquiera para clasificar"]);

    let llm = ScriptedLlm::replying(&["es una factura", "factura", "tipo = factura"]);
    let mut records: Vec<PipelineRecord> = Vec::new();
    pipeline(config(5), llm.clone(), MissingOcr::default())
        .run(dir.path(), &mut records)
        .await
        .unwrap();

    let record = &records[0];
    assert_eq!(record.error_code, Some(ErrorCode::UnparsableOutput));
    assert_eq!(record.result.tokens_usage(), TokenUsage::new(300, 30));
    assert_eq!(llm.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_ocr_is_asked_once_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let long_page = "Pagina uno con texto incrustado suficiente para superar el umbral minimo";
    write_pdf(dir.path(), "a.pdf", &[long_page, ""]);
    write_pdf(dir.path(), "b.pdf", &[""]);

    let llm = ScriptedLlm::replying(&[r#"{"tipo": "a"}"#, r#"{"tipo": "b"}"#]);
    let ocr = MissingOcr::default();
    let p = pipeline(config(5), llm.clone(), ocr.clone());
    let mut records: Vec<PipelineRecord> = Vec::new();
    p.run(dir.path(), &mut records).await.unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert!(p.cascade().ocr_omitted());

    // Page one's text only; the empty scan page adds nothing.
    let sent = llm.user_messages();
    assert!(sent[0].contains("Pagina uno con texto incrustado"));
    assert!(!sent[0].contains("\n\n"));
    // A document with no text at all is still classified.
    assert_eq!(sent[1], "");
    assert_eq!(records[1].status, RecordStatus::Ok);

    let summary = records[0].metadata.extraction.as_ref().unwrap();
    assert_eq!(summary.native_pages, 1);
    assert_eq!(summary.empty_pages, 1);
}

#[tokio::test]
async fn missing_directory_aborts_before_any_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut records: Vec<PipelineRecord> = Vec::new();
    let result = pipeline(config(5), ScriptedLlm::down(), MissingOcr::default())
        .run(&dir.path().join("missing"), &mut records)
        .await;

    let err = tokio_test::assert_err!(result);
    assert!(matches!(err, TriageError::InputDirNotFound { .. }));
    assert!(records.is_empty());
}

#[tokio::test]
async fn directory_without_pdfs_aborts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
    let mut records: Vec<PipelineRecord> = Vec::new();
    let result = pipeline(config(5), ScriptedLlm::down(), MissingOcr::default())
        .run(dir.path(), &mut records)
        .await;

    assert!(matches!(
        tokio_test::assert_err!(result),
        TriageError::NoPdfsFound { .. }
    ));
}

struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn sink_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "a.pdf", &["Texto suficiente para el primer documento"]);
    write_pdf(dir.path(), "b.pdf", &["Texto suficiente para el segundo documento"]);

    let llm = ScriptedLlm::replying(&[r#"{"tipo": "a"}"#, r#"{"tipo": "b"}"#]);
    let mut sink = JsonLinesSink::new(ClosedPipe, false);
    let result = pipeline(config(5), llm.clone(), MissingOcr::default())
        .run(dir.path(), &mut sink)
        .await;

    assert!(matches!(result, Err(TriageError::OutputWriteFailed { .. })));
    // The batch stops at the first record that cannot be written.
    assert_eq!(llm.calls(), 1);
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl BatchProgressCallback for EventLog {
    fn on_batch_start(&self, total_documents: usize) {
        self.0.lock().unwrap().push(format!("batch {total_documents}"));
    }
    fn on_document_start(&self, count: usize, file: &str) {
        self.0.lock().unwrap().push(format!("start {count} {file}"));
    }
    fn on_document_complete(&self, record: &PipelineRecord) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done {} {}", record.count, record.status.as_str()));
    }
    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.0.lock().unwrap().push(format!("end {}", summary.documents));
    }
}

#[tokio::test(start_paused = true)]
async fn progress_events_follow_processing_order() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(dir.path(), "a.pdf", &["Primer documento con bastante texto dentro"]);
    write_pdf(dir.path(), "b.pdf", &["p"; 6]);

    let log = Arc::new(EventLog::default());
    let config = TriageConfig::builder()
        .instructions("Clasifica.")
        .progress_callback(log.clone())
        .build()
        .unwrap();
    let llm = ScriptedLlm::replying(&[r#"{"tipo": "a"}"#]);
    let mut records: Vec<PipelineRecord> = Vec::new();
    pipeline(config, llm, MissingOcr::default())
        .run(dir.path(), &mut records)
        .await
        .unwrap();

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "batch 2",
            "start 1 a.pdf",
            "done 1 ok",
            "start 2 b.pdf",
            "done 2 error",
            "end 2",
        ]
    );
}
