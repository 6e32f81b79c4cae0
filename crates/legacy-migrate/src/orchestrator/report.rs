//! Per-run statistics and the end-of-run summary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome for one destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// At least one legacy source existed; rows may still be zero.
    Loaded,
    /// No contributing legacy table exists.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    /// Rows submitted to the destination after filtering and merging.
    pub rows: u64,
    pub status: TableStatus,
}

impl TableReport {
    pub fn loaded(table: impl Into<String>, rows: u64) -> Self {
        Self {
            table: table.into(),
            rows,
            status: TableStatus::Loaded,
        }
    }

    pub fn skipped(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: 0,
            status: TableStatus::Skipped,
        }
    }
}

/// Result of a migration run. Built once per run and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Destination backend ("sqlite" or "postgres").
    pub target: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table outcomes in load order.
    pub tables: Vec<TableReport>,

    /// Sum of `rows` over all tables.
    pub total_rows: u64,
}

impl MigrationReport {
    pub fn start(target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            tables: Vec::new(),
            total_rows: 0,
        }
    }

    pub fn record(&mut self, entry: TableReport) {
        self.total_rows += entry.rows;
        self.tables.push(entry);
    }

    pub fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
    }

    /// Entry for `table`, if it was part of the run.
    pub fn get(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Rows recorded for `table` (0 when skipped or absent).
    pub fn rows(&self, table: &str) -> u64 {
        self.get(table).map_or(0, |t| t.rows)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration finished. Rows copied per table:")?;
        for entry in &self.tables {
            match entry.status {
                TableStatus::Loaded => writeln!(f, "  - {}: {}", entry.table, entry.rows)?,
                TableStatus::Skipped => writeln!(
                    f,
                    "  - {}: {} (skipped: not present in source)",
                    entry.table, entry.rows
                )?,
            }
        }
        write!(
            f,
            "Total: {} rows in {:.1}s (run {})",
            self.total_rows, self.duration_seconds, self.run_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MigrationReport {
        let mut report = MigrationReport::start("sqlite");
        report.record(TableReport::loaded("users", 3));
        report.record(TableReport::loaded("prpr_caches", 0));
        report.record(TableReport::skipped("chat_cfg"));
        report.finish();
        report
    }

    #[test]
    fn test_summary_distinguishes_skipped_from_empty() {
        let text = report().to_string();
        assert!(text.starts_with("Migration finished. Rows copied per table:\n"));
        assert!(text.contains("  - users: 3\n"));
        assert!(text.contains("  - prpr_caches: 0\n"));
        assert!(text.contains("  - chat_cfg: 0 (skipped: not present in source)\n"));
        assert!(text.contains("Total: 3 rows"));
    }

    #[test]
    fn test_totals_and_lookup() {
        let report = report();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.rows("users"), 3);
        assert_eq!(report.rows("missing"), 0);
        assert_eq!(report.get("chat_cfg").unwrap().status, TableStatus::Skipped);
        assert!(report.completed_at >= report.started_at);
    }

    #[test]
    fn test_json_keeps_load_order() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let tables = value["tables"].as_array().unwrap();
        assert_eq!(tables[0]["table"], "users");
        assert_eq!(tables[2]["status"], "skipped");
        assert_eq!(value["total_rows"], 3);
    }
}
