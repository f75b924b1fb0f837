//! Processing history: one record per successful run, plus aggregate stats.
//!
//! The pipeline never writes history itself. Callers record an entry after a
//! successful run and read [`HistoryStats`] back for a per-requester summary
//! ("files processed, pages processed, average output size, last run").
//!
//! [`JsonlLedger`] stores one JSON object per line. Appending a line is
//! atomic enough for a single-process tool, and the file stays greppable.

use crate::config::DegradationParameters;
use crate::error::HistoryError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// One completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who requested the run (chat user id, login name, …). Optional for
    /// single-user tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub original_name: String,
    pub output_name: String,
    pub original_size: u64,
    pub output_size: u64,
    pub page_count: usize,
    pub params: DegradationParameters,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

impl HistoryEntry {
    /// Build an entry stamped with the current time.
    pub fn now(
        original_name: impl Into<String>,
        output_name: impl Into<String>,
        original_size: u64,
        output_size: u64,
        page_count: usize,
        params: DegradationParameters,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            user: None,
            original_name: original_name.into(),
            output_name: output_name.into(),
            original_size,
            output_size,
            page_count,
            params,
            created_at,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Aggregates over a set of history entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_files: usize,
    pub total_pages: usize,
    /// Mean output size in bytes; 0 when there are no entries.
    pub avg_output_size: f64,
    /// `created_at` of the most recent entry.
    pub last_processed: Option<u64>,
}

impl HistoryStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a HistoryEntry>) -> Self {
        let mut stats = Self::default();
        let mut total_output: u64 = 0;
        for entry in entries {
            stats.total_files += 1;
            stats.total_pages += entry.page_count;
            total_output += entry.output_size;
            stats.last_processed = stats.last_processed.max(Some(entry.created_at));
        }
        if stats.total_files > 0 {
            stats.avg_output_size = total_output as f64 / stats.total_files as f64;
        }
        stats
    }
}

/// Somewhere completed runs are recorded.
pub trait HistoryLedger {
    fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError>;

    fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError>;

    /// Aggregate stats, optionally restricted to one `user`.
    fn stats(&self, user: Option<&str>) -> Result<HistoryStats, HistoryError> {
        let entries = self.entries()?;
        Ok(HistoryStats::from_entries(
            entries
                .iter()
                .filter(|e| user.is_none() || e.user.as_deref() == user),
        ))
    }
}

/// A history ledger backed by a JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryLedger for JsonlLedger {
    fn record(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io_err(e))?;

        debug!("Recorded history entry in {}", self.path.display());
        Ok(())
    }

    /// All entries in insertion order. A missing file is an empty history.
    fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: HistoryEntry = serde_json::from_str(&line)
                .map_err(|source| HistoryError::Malformed { line: i + 1, source })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, pages: usize, output_size: u64, created_at: u64) -> HistoryEntry {
        HistoryEntry {
            created_at,
            ..HistoryEntry::now(
                "report.pdf",
                "corrupted_report.pdf",
                1_000,
                output_size,
                pages,
                DegradationParameters::default(),
            )
            .with_user(user)
        }
    }

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("history.jsonl"));
        assert!(ledger.entries().unwrap().is_empty());
        assert_eq!(ledger.stats(None).unwrap(), HistoryStats::default());
    }

    #[test]
    fn records_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("sub").join("history.jsonl"));
        let first = entry("alice", 3, 300, 10);
        let second = entry("bob", 5, 500, 20);
        ledger.record(&first).unwrap();
        ledger.record(&second).unwrap();

        assert_eq!(ledger.entries().unwrap(), vec![first, second]);
    }

    #[test]
    fn stats_aggregate_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::new(dir.path().join("history.jsonl"));
        ledger.record(&entry("alice", 3, 300, 10)).unwrap();
        ledger.record(&entry("alice", 7, 500, 30)).unwrap();
        ledger.record(&entry("bob", 1, 100, 50)).unwrap();

        let alice = ledger.stats(Some("alice")).unwrap();
        assert_eq!(alice.total_files, 2);
        assert_eq!(alice.total_pages, 10);
        assert_eq!(alice.avg_output_size, 400.0);
        assert_eq!(alice.last_processed, Some(30));

        let all = ledger.stats(None).unwrap();
        assert_eq!(all.total_files, 3);
        assert_eq!(all.last_processed, Some(50));

        assert_eq!(ledger.stats(Some("carol")).unwrap().total_files, 0);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let ledger = JsonlLedger::new(&path);
        ledger.record(&entry("alice", 1, 1, 1)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json}\n")
            .unwrap();

        match ledger.entries().unwrap_err() {
            HistoryError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
