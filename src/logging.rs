//! Request ledger: one JSONL record per proxied request.
//!
//! Diagnostics go through `tracing`; this ledger is the durable trail of what
//! the proxy actually did to each request: which model the client asked for,
//! what it was mapped to, and how the request ended. Records are appended to
//! a JSONL file and kept in a bounded in-memory ring for inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub original_model: String,
    pub effective_model: String,
    pub messages: usize,
    pub tools: usize,
    pub streaming: bool,
    pub status: u16,
}

impl RequestRecord {
    pub fn new(
        endpoint: impl Into<String>,
        original_model: impl Into<String>,
        effective_model: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            original_model: original_model.into(),
            effective_model: effective_model.into(),
            messages: 0,
            tools: 0,
            streaming: false,
            status: 200,
        }
    }

    pub fn counts(mut self, messages: usize, tools: usize) -> Self {
        self.messages = messages;
        self.tools = tools;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}

pub struct Ledger {
    records: VecDeque<RequestRecord>,
    writer: Option<BufWriter<File>>,
}

impl Ledger {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;

        Ok(Self {
            records: VecDeque::with_capacity(MAX_RECORDS),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// In-memory only, for tests and ad-hoc use.
    pub fn in_memory() -> Self {
        Self {
            records: VecDeque::new(),
            writer: None,
        }
    }

    pub fn record(&mut self, record: RequestRecord) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&record) {
                let _ = writeln!(writer, "{json}");
                let _ = writer.flush();
            }
        }
        if self.records.len() >= MAX_RECORDS {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }
}

/// Cheaply cloneable handle shared across request handlers.
#[derive(Clone)]
pub struct SharedLedger(Arc<Mutex<Ledger>>);

impl SharedLedger {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Ledger::open(file_path)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Ledger::in_memory())))
    }

    pub fn record(&self, record: RequestRecord) {
        tracing::info!(
            endpoint = %record.endpoint,
            original = %record.original_model,
            effective = %record.effective_model,
            messages = record.messages,
            tools = record.tools,
            streaming = record.streaming,
            status = record.status,
            "request"
        );
        if let Ok(mut ledger) = self.0.lock() {
            ledger.record(record);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<RequestRecord> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn test_records_append_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.jsonl");

        let ledger = SharedLedger::open(&path).unwrap();
        ledger.record(
            RequestRecord::new("/v1/messages", "claude-3-5-haiku-20241022", "openai/gpt-4o-mini")
                .counts(3, 1)
                .streaming(true),
        );
        ledger.record(
            RequestRecord::new("/v1/messages", "claude-sonnet-4-20250514", "openai/gpt-4o")
                .status(429),
        );

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first: RequestRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first.effective_model, "openai/gpt-4o-mini");
        assert!(first.streaming);
    }

    #[test]
    fn test_recent_returns_newest_first() {
        let ledger = SharedLedger::in_memory();
        for i in 0..5 {
            ledger.record(RequestRecord::new("/v1/messages", format!("m{i}"), "e"));
        }

        let recent = ledger.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].original_model, "m4");
        assert_eq!(recent[1].original_model, "m3");
    }
}
