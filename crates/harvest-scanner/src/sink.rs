//! Record sinks: where extracted records go after a run.

use crate::error::{Result, ScanError};
use crate::record::ExtractedRecord;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Destination for extracted records.
///
/// Called once per record. Failures are the sink's concern: the caller logs
/// and counts them but never retries.
pub trait RecordSink {
    /// Store one record.
    fn insert(&mut self, record: &ExtractedRecord) -> Result<()>;
}

/// Writes one JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Flush and return the writer
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn insert(&mut self, record: &ExtractedRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| ScanError::Sink(e.to_string()))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ExtractedRecord>>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records
    #[must_use]
    pub fn records(&self) -> Vec<ExtractedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn insert(&mut self, record: &ExtractedRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Counts from one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Records the sink accepted
    pub inserted: usize,
    /// Records the sink rejected
    pub failed: usize,
}

/// Push every record into the sink exactly once.
pub fn deliver<S: RecordSink + ?Sized>(records: &[ExtractedRecord], sink: &mut S) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for record in records {
        match sink.insert(record) {
            Ok(()) => report.inserted += 1,
            Err(e) => {
                report.failed += 1;
                warn!(site_id = %record.site_id, error = %e, "record sink rejected record");
            }
        }
    }

    info!(
        inserted = report.inserted,
        failed = report.failed,
        "records delivered"
    );
    report
}
