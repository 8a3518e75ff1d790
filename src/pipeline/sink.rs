//! Result and notification sinks.
//!
//! Both are external collaborators shared by every worker, so implementations
//! must accept concurrent posts (`Send + Sync`, interior locking).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Result rejected: {0}")]
    Rejected(String),
}

/// Kind of analysis result posted to the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    KeywordHit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    LikelyNotable,
}

/// Set name under which OCR hits are grouped in the case.
pub const RESULT_SET_NAME: &str = "Text Files";

/// Text recognised in one source file, ready to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source_id: u64,
    pub source_name: String,
    pub result_type: ResultType,
    pub score: Score,
    pub set_name: String,
    pub keyword_text: String,
    /// Module that produced the result.
    pub owner: String,
    pub job_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn keyword_hit(
        source_id: u64,
        source_name: &str,
        text: String,
        owner: &str,
        job_id: Uuid,
    ) -> Self {
        Self {
            source_id,
            source_name: source_name.to_string(),
            result_type: ResultType::KeywordHit,
            score: Score::LikelyNotable,
            set_name: RESULT_SET_NAME.to_string(),
            keyword_text: text,
            owner: owner.to_string(),
            job_id,
            created_at: Utc::now(),
        }
    }
}

/// Store that indexes extracted text for keyword search.
pub trait ResultSink {
    fn post_result(&self, result: &ExtractionResult) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Data,
    Warning,
}

/// Operator-facing message posted to the host's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMessage {
    pub severity: Severity,
    pub source: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}

impl IngestMessage {
    pub fn new(severity: Severity, source: &str, text: impl Into<String>) -> Self {
        Self {
            severity,
            source: source.to_string(),
            text: text.into(),
            posted_at: Utc::now(),
        }
    }
}

/// Fire-and-forget notification channel.
pub trait NotificationSink {
    fn post_message(&self, message: IngestMessage);
}

// ──────────────────────────────────────────────
// Implementations
// ──────────────────────────────────────────────

/// Appends one JSON object per line to a file.
pub struct JsonlResultSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlResultSink {
    /// Open (or create) the result file for appending.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlResultSink {
    fn post_result(&self, result: &ExtractionResult) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| SinkError::Rejected("result file lock poisoned".into()))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps posted results in memory.
#[derive(Default)]
pub struct MemoryResultSink {
    results: Mutex<Vec<ExtractionResult>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ExtractionResult> {
        self.results
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for MemoryResultSink {
    fn post_result(&self, result: &ExtractionResult) -> Result<(), SinkError> {
        self.results
            .lock()
            .map_err(|_| SinkError::Rejected("result store lock poisoned".into()))?
            .push(result.clone());
        Ok(())
    }
}

/// Keeps posted messages in memory.
#[derive(Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<IngestMessage>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<IngestMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MemoryNotifier {
    fn post_message(&self, message: IngestMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

/// Forwards messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn post_message(&self, message: IngestMessage) {
        match message.severity {
            Severity::Warning => {
                tracing::warn!(source = %message.source, "{}", message.text)
            }
            Severity::Info | Severity::Data => {
                tracing::info!(source = %message.source, severity = ?message.severity, "{}", message.text)
            }
        }
    }
}
