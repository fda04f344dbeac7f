#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON logging shared by the echobeats crates.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-step tracing.
    Debug,
    /// Lifecycle events.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Failures.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Short dotted message key, e.g. `scheduler.cycle.completed`.
    pub message: String,
    /// Structured fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Adds one metadata field.
    #[must_use]
    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges the fields of a JSON object into the metadata. Non-objects are ignored.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &serde_json::Value) -> Self {
        if let Some(obj) = metadata.as_object() {
            for (key, value) in obj {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

/// Destination for structured log records.
pub trait LogSink: Send + Sync {
    /// Persists the record if it passes the sink's level filter.
    fn log(&self, record: &LogRecord) -> Result<()>;
}

/// Thread-safe JSON-lines logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path, accepting every level.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            min_level: LogLevel::Debug,
            writer: Mutex::new(file),
        })
    }

    /// Drops records less severe than `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// In-process sink that keeps records in memory. Used by hosts that render logs
/// themselves and by tests.
#[derive(Debug)]
pub struct MemoryLogger {
    min_level: LogLevel,
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    /// Creates an empty logger accepting every level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_level: LogLevel::Debug,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Drops records less severe than `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Copies out the retained records.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Number of retained records whose message equals `message`.
    #[must_use]
    pub fn count(&self, message: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message == message)
            .count()
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemoryLogger {
    fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level >= self.min_level {
            self.records.lock().push(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("nested/cycle.log")).unwrap();
        let record =
            LogRecord::new("scheduler", LogLevel::Info, "scheduler.started").with_field("streams", 3);
        logger.log(&record).unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"scheduler.started\""));
        assert!(content.contains("\"level\":\"INFO\""));
        assert!(content.contains("\"streams\":3"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn level_filter_drops_debug() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("cycle.log"))
            .unwrap()
            .with_min_level(LogLevel::Info);
        logger
            .log(&LogRecord::new("scheduler", LogLevel::Debug, "scheduler.step"))
            .unwrap();
        logger
            .log(&LogRecord::new("scheduler", LogLevel::Warn, "scheduler.delta.ignored"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(!content.contains("scheduler.step"));
        assert!(content.contains("scheduler.delta.ignored"));
    }

    #[test]
    fn memory_logger_merges_metadata() {
        let logger = MemoryLogger::new();
        let record = LogRecord::new("scheduler", LogLevel::Info, "scheduler.reset")
            .with_metadata(&serde_json::json!({ "step": 0, "cycle": 0 }));
        logger.log(&record).unwrap();
        assert_eq!(logger.count("scheduler.reset"), 1);
        assert_eq!(logger.records()[0].metadata["cycle"], 0);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }
}
