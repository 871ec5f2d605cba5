//! SQLite implementation of the Result Store

use crate::analysis::AnalysisSchema;
use crate::error::StorageError;
use crate::store::database::Database;
use crate::store::facts::{insert_labels, insert_page_metadata, insert_single, record_analysis};
use crate::store::schema::{VOICEMAIL_LABELS, VOICEMAIL_SINGLES};
use crate::store::{AnalysisRecord, PresetCounter, PresetStats, ResultStore};
use rusqlite::params;
use std::sync::Arc;
use tracing::{debug, info};

/// SQLite-backed implementation of ResultStore
pub struct SqliteResultStore {
    db: Arc<Database>,
}

impl SqliteResultStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get the underlying database (for the unit source and inspection)
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

impl ResultStore for SqliteResultStore {
    fn persist(&self, record: &AnalysisRecord<'_>) -> Result<(), StorageError> {
        let unit_id = record.unit_id;
        self.db.with_transaction(|tx| {
            match record.schema {
                AnalysisSchema::Voicemail => {
                    for vocabulary in VOICEMAIL_LABELS {
                        if let Some(labels) = record.fields.labels(vocabulary.field) {
                            insert_labels(tx, unit_id, vocabulary, labels)?;
                        }
                    }
                    for fact in VOICEMAIL_SINGLES {
                        if let Some(value) = record.fields.text(fact.field) {
                            insert_single(tx, unit_id, fact, value)?;
                        }
                    }
                }
                AnalysisSchema::Page => {
                    insert_page_metadata(tx, unit_id, record.model, record.fields)?;
                }
            }
            record_analysis(
                tx,
                unit_id,
                record.schema.as_str(),
                record.preset,
                chrono::Utc::now().timestamp(),
            )
        })?;

        info!(unit_id, preset = record.preset, schema = %record.schema, "Persisted analysis");
        Ok(())
    }

    fn mark_failed(&self, unit_id: i64) -> Result<bool, StorageError> {
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO failed_units (unit_id, failed_at) VALUES (?1, ?2)",
                params![unit_id, chrono::Utc::now().timestamp()],
            )
            .map_err(|e| StorageError::from_sqlite(e, "mark unit failed"))
        })?;
        debug!(unit_id, newly_marked = inserted > 0, "Marked unit failed");
        Ok(inserted > 0)
    }

    fn increment(&self, preset: &str, counter: PresetCounter) -> Result<(), StorageError> {
        let column = counter.column();
        let sql = format!(
            "INSERT INTO preset_stats (preset_name, {column}) VALUES (?1, 1)
             ON CONFLICT(preset_name) DO UPDATE SET {column} = {column} + 1",
            column = column
        );
        self.db.with_conn(|conn| {
            conn.execute(&sql, params![preset])
                .map_err(|e| StorageError::from_sqlite(e, &format!("increment {}", column)))
        })?;
        Ok(())
    }

    fn preset_stats(&self) -> Result<Vec<PresetStats>, StorageError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT preset_name, success_count, failure_count, retry_error_count
                     FROM preset_stats ORDER BY preset_name",
                )
                .map_err(|e| StorageError::from_sqlite(e, "read preset stats"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PresetStats {
                        preset_name: row.get(0)?,
                        success_count: row.get(1)?,
                        failure_count: row.get(2)?,
                        retry_error_count: row.get(3)?,
                    })
                })
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(|e| StorageError::from_sqlite(e, "read preset stats"))?;
            Ok(rows)
        })
    }
}
