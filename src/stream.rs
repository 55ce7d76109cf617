//! Record streaming: emit each document's record as soon as it exists.
//!
//! ## Why stream?
//!
//! A batch over a large directory takes minutes. Writing each record the
//! moment it is complete lets downstream consumers start work immediately,
//! and a crash halfway through still leaves every finished record on disk.
//!
//! [`JsonLinesSink`] serialises the whole record before writing any byte,
//! so a record is either emitted completely or not at all, and flushes
//! after every record.

use crate::output::PipelineRecord;
use std::io::{self, Write};

/// Destination for pipeline records.
pub trait RecordSink {
    /// Write one record. An error aborts the batch.
    fn emit(&mut self, record: &PipelineRecord) -> io::Result<()>;
}

/// JSON records on any writer, each followed by a blank separator line.
///
/// Compact mode puts each record on a single line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self { writer, pretty }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout(pretty: bool) -> Self {
        Self::new(io::stdout(), pretty)
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &PipelineRecord) -> io::Result<()> {
        let mut buf = if self.pretty {
            serde_json::to_vec_pretty(record)
        } else {
            serde_json::to_vec(record)
        }
        .map_err(io::Error::other)?;
        buf.extend_from_slice(b"\n\n");

        self.writer.write_all(&buf)?;
        self.writer.flush()
    }
}

/// Collect records in memory.
impl RecordSink for Vec<PipelineRecord> {
    fn emit(&mut self, record: &PipelineRecord) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
