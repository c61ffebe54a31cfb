//! Exception sink: an append-only CSV plus a free-text operational log.
//!
//! Every failed, blocked, or skipped action lands as one CSV row that a
//! records manager can filter and audit later. The operational log carries
//! the narrative instead: warnings, checkpoint notes, and run summaries.
//! Both files are opened in append mode so consecutive runs accumulate into
//! the same audit trail; the CSV header goes in with the first record of a
//! fresh file, never twice.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result alias for exception-sink operations.
pub type ExceptionSinkResult<T> = Result<T, ExceptionLogError>;

/// Errors from the exception sink.
#[derive(Debug, thiserror::Error)]
pub enum ExceptionLogError {
    #[error("exception log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write exception record: {0}")]
    Csv(#[from] csv::Error),
}

/// What the engine was doing when the exception happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionAction {
    Load,
    Delete,
    Skip,
}

impl fmt::Display for ExceptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionAction::Load => write!(f, "Load"),
            ExceptionAction::Delete => write!(f, "Delete"),
            ExceptionAction::Skip => write!(f, "Skip"),
        }
    }
}

/// How the action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptionOutcome {
    Failed,
    Blocked,
    Skipped,
}

impl fmt::Display for ExceptionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionOutcome::Failed => write!(f, "Failed"),
            ExceptionOutcome::Blocked => write!(f, "Blocked"),
            ExceptionOutcome::Skipped => write!(f, "Skipped"),
        }
    }
}

/// One row of the exception CSV. Field order is the column order.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionRecord {
    pub timestamp: DateTime<Utc>,
    pub site: String,
    pub library: String,
    /// Server-relative path of the file, or empty for library-level records.
    pub file_ref: String,
    /// Item id as text, empty for library-level records.
    pub item_id: String,
    pub action: ExceptionAction,
    pub result: ExceptionOutcome,
    pub message: String,
}

const CSV_HEADER: &[&str] = &[
    "timestamp", "site", "library", "file_ref", "item_id", "action", "result", "message",
];

/// Append-only exception CSV plus the operational log.
pub struct ExceptionLog {
    csv: csv::Writer<File>,
    /// Header is written with the first record, so a run that records
    /// nothing leaves the file empty.
    needs_header: bool,
    ops: BufWriter<File>,
    csv_path: PathBuf,
    ops_path: PathBuf,
}

impl ExceptionLog {
    /// Open (or create) both files in append mode.
    pub fn open(
        csv_path: impl Into<PathBuf>,
        ops_path: impl Into<PathBuf>,
    ) -> ExceptionSinkResult<Self> {
        let csv_path = csv_path.into();
        let ops_path = ops_path.into();

        for path in [&csv_path, &ops_path] {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
        }

        let csv_file = OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let needs_header = csv_file.metadata()?.len() == 0;

        let csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(csv_file);

        let ops_file = OpenOptions::new().create(true).append(true).open(&ops_path)?;

        Ok(Self {
            csv,
            needs_header,
            ops: BufWriter::new(ops_file),
            csv_path,
            ops_path,
        })
    }

    /// Append one exception row. Flushed immediately; a killed run loses
    /// nothing already recorded.
    pub fn record(&mut self, record: &ExceptionRecord) -> ExceptionSinkResult<()> {
        if self.needs_header {
            self.csv.write_record(CSV_HEADER)?;
            self.needs_header = false;
        }
        self.csv.serialize(record)?;
        self.csv.flush()?;
        Ok(())
    }

    /// Append one line to the operational log.
    pub fn note(&mut self, level: &str, message: &str) -> ExceptionSinkResult<()> {
        writeln!(
            self.ops,
            "{} [{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        )?;
        self.ops.flush()?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn ops_path(&self) -> &Path {
        &self.ops_path
    }
}
