//! Per-comparison trace rows for ranking runs.
//!
//! Rows are buffered per group while the run is in flight and written once
//! the group finishes, ordered by schedule slot. Two runs with the same seed
//! therefore produce the same trace file regardless of verdict arrival order;
//! `comparison_index` still records the order verdicts actually landed in.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use super::types::{CandidatePayload, GroupKey};

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTrace {
    pub timestamp_ms: i64,
    pub group: GroupKey,
    /// 1-based position in arrival order.
    pub comparison_index: usize,
    pub slot: usize,
    pub first_index: usize,
    pub second_index: usize,
    /// blake3 of the text the judge saw for each side.
    pub first_hash: String,
    pub second_hash: String,
    pub verdict: Option<String>,
    pub raw_answer: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace sink poisoned by an earlier panic")]
    Poisoned,
}

pub trait TraceSink: Send + Sync {
    /// Accept one row. Cheap; nothing is written yet.
    fn record(&self, row: ComparisonTrace) -> Result<(), TraceError>;

    /// The group's run has ended. Write its rows out.
    fn finish_group(&self, group: GroupKey) -> Result<(), TraceError>;
}

/// JSON-lines trace file, one row per comparison.
pub struct JsonlTraceSink {
    inner: Mutex<JsonlState>,
}

struct JsonlState {
    writer: BufWriter<File>,
    pending: BTreeMap<GroupKey, Vec<ComparisonTrace>>,
}

impl JsonlState {
    fn write_group(&mut self, mut rows: Vec<ComparisonTrace>) -> Result<(), TraceError> {
        rows.sort_by_key(|r| r.slot);
        for row in &rows {
            serde_json::to_writer(&mut self.writer, row)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl JsonlTraceSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(JsonlState {
                writer: BufWriter::new(file),
                pending: BTreeMap::new(),
            }),
        })
    }

    /// Write out groups that never finished, in group order, and flush.
    pub fn close(self) -> Result<(), TraceError> {
        let mut state = self.inner.into_inner().map_err(|_| TraceError::Poisoned)?;
        let pending = std::mem::take(&mut state.pending);
        for rows in pending.into_values() {
            state.write_group(rows)?;
        }
        state.writer.flush()?;
        Ok(())
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, row: ComparisonTrace) -> Result<(), TraceError> {
        let mut state = self.inner.lock().map_err(|_| TraceError::Poisoned)?;
        state.pending.entry(row.group).or_default().push(row);
        Ok(())
    }

    fn finish_group(&self, group: GroupKey) -> Result<(), TraceError> {
        let mut state = self.inner.lock().map_err(|_| TraceError::Poisoned)?;
        match state.pending.remove(&group) {
            Some(rows) => state.write_group(rows),
            None => Ok(()),
        }
    }
}

pub fn payload_hash(payload: &CandidatePayload) -> String {
    blake3::hash(payload.render_text().as_bytes())
        .to_hex()
        .to_string()
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
