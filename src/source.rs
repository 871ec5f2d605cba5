//! Input unit selection and import.
//!
//! The batch loop asks a [`UnitSource`] for the next window of work. The SQLite
//! source reads `input_units` and skips anything already analyzed, anything
//! failure-marked and anything whose grouping key is excluded.

use crate::analysis::InputUnit;
use crate::error::{AnalyzerError, StorageError};
use crate::store::Database;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait UnitSource: Send + Sync {
    /// Up to `size` eligible units, in ascending id order.
    fn select_batch(&self, size: usize) -> Result<Vec<InputUnit>, StorageError>;
}

pub struct SqliteUnitSource {
    db: Arc<Database>,
    excluded_group_keys: Vec<i64>,
}

impl SqliteUnitSource {
    pub fn new(db: Arc<Database>, excluded_group_keys: Vec<i64>) -> Self {
        Self {
            db,
            excluded_group_keys,
        }
    }

    fn selection_sql(&self) -> String {
        let mut sql = String::from(
            "SELECT u.id, u.group_key, u.body FROM input_units u
             WHERE u.body IS NOT NULL AND TRIM(u.body) <> ''
               AND NOT EXISTS (SELECT 1 FROM analyses a WHERE a.unit_id = u.id)
               AND NOT EXISTS (SELECT 1 FROM failed_units f WHERE f.unit_id = u.id)",
        );
        if !self.excluded_group_keys.is_empty() {
            let placeholders = vec!["?"; self.excluded_group_keys.len()].join(", ");
            sql.push_str(&format!(
                "\n               AND (u.group_key IS NULL OR u.group_key NOT IN ({}))",
                placeholders
            ));
        }
        sql.push_str("\n             ORDER BY u.id ASC LIMIT ?");
        sql
    }
}

impl UnitSource for SqliteUnitSource {
    fn select_batch(&self, size: usize) -> Result<Vec<InputUnit>, StorageError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let sql = self.selection_sql();
        let mut bindings: Vec<Value> = self
            .excluded_group_keys
            .iter()
            .map(|key| Value::Integer(*key))
            .collect();
        bindings.push(Value::Integer(i64::try_from(size).unwrap_or(i64::MAX)));

        let units = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| StorageError::from_sqlite(e, "prepare unit selection"))?;
            stmt.query_map(params_from_iter(bindings.iter()), |row| {
                Ok(InputUnit {
                    id: row.get(0)?,
                    group_key: row.get(1)?,
                    body: row.get(2)?,
                })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| StorageError::from_sqlite(e, "select unit batch"))
        })?;

        debug!(requested = size, selected = units.len(), "Selected unit batch");
        Ok(units)
    }
}

/// One line of an ingest file.
#[derive(Debug, Deserialize)]
struct IngestLine {
    id: i64,
    #[serde(default)]
    group_key: Option<i64>,
    text: String,
}

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Load `{id, group_key?, text}` JSON lines into `input_units`. Existing ids are
/// left untouched and counted as skipped; blank lines are ignored.
pub fn ingest_jsonl(db: &Database, path: &Path) -> Result<IngestSummary, AnalyzerError> {
    let file = std::fs::File::open(path).map_err(|e| {
        AnalyzerError::Ingest(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = std::io::BufReader::new(file);

    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            AnalyzerError::Ingest(format!("Failed to read line {}: {}", index + 1, e))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IngestLine = serde_json::from_str(&line).map_err(|e| {
            AnalyzerError::Ingest(format!("Invalid record on line {}: {}", index + 1, e))
        })?;
        lines.push(parsed);
    }

    let summary = db.with_transaction(|tx| {
        let mut summary = IngestSummary::default();
        for line in &lines {
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO input_units (id, group_key, body) VALUES (?1, ?2, ?3)",
                    params![line.id, line.group_key, line.text],
                )
                .map_err(|e| StorageError::from_sqlite(e, "insert input unit"))?;
            if inserted > 0 {
                summary.inserted += 1;
            } else {
                warn!(unit_id = line.id, "Input unit already present, skipping");
                summary.skipped += 1;
            }
        }
        Ok(summary)
    })?;

    info!(
        path = %path.display(),
        inserted = summary.inserted,
        skipped = summary.skipped,
        "Ingested input units"
    );
    Ok(summary)
}
