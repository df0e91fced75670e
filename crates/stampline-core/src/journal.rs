//! Run journal: one JSON line per annotate run, next to the ledger

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::walker::{RunSummary, StopReason};

/// Journal path for a ledger (`stamps.csv` → `stamps.csv.runs.jsonl`)
pub fn journal_path(ledger: &Path) -> PathBuf {
    let mut name = ledger.file_name().unwrap_or_default().to_os_string();
    name.push(".runs.jsonl");
    ledger.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub annotator: String,
    pub target_column: String,
    pub start_index: usize,
    pub end_index: Option<usize>,
    pub succeeded: usize,
    pub skipped_failed: usize,
    pub remaining: usize,
    pub calls: usize,
    pub resume_from: Option<usize>,
    pub stop: StopReason,
}

impl RunRecord {
    pub fn new(
        started_at: DateTime<Utc>,
        annotator: &str,
        target_column: &str,
        window: (usize, Option<usize>),
        summary: &RunSummary,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            annotator: annotator.to_string(),
            target_column: target_column.to_string(),
            start_index: window.0,
            end_index: window.1,
            succeeded: summary.succeeded,
            skipped_failed: summary.skipped_failed,
            remaining: summary.remaining,
            calls: summary.calls,
            resume_from: summary.resume_from,
            stop: summary.stop,
        }
    }
}

/// Append one record
pub fn append(path: &Path, record: &RunRecord) -> io::Result<()> {
    let line = serde_json::to_string(record).map_err(io::Error::other)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Read all records; a missing journal reads as empty.
///
/// Lines that fail to parse (a torn final write) are skipped with a warning.
pub fn read_all(path: &Path) -> io::Result<Vec<RunRecord>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("{}:{}: skipping bad journal line: {e}", path.display(), n + 1),
        }
    }
    Ok(records)
}
