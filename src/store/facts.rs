//! Fact writers. Each function runs against the caller's open transaction.

use crate::analysis::{AnalysisFields, LabelSet, PAGE_COLUMNS};
use crate::error::StorageError;
use crate::store::schema::{LabelVocabulary, SingleValueFact};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

/// Insert new labels into the vocabulary, then link every label to the unit.
/// Returns the number of junction rows written.
pub(crate) fn insert_labels(
    conn: &Connection,
    unit_id: i64,
    vocabulary: &LabelVocabulary,
    labels: &LabelSet,
) -> Result<usize, StorageError> {
    if labels.is_empty() {
        return Ok(0);
    }

    let insert_sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
        vocabulary.table, vocabulary.column
    );
    for label in labels.iter() {
        conn.execute(&insert_sql, params![label])
            .map_err(|e| StorageError::from_sqlite(e, &format!("insert {}", vocabulary.column)))?;
    }

    let placeholders = vec!["?"; labels.len()].join(", ");
    let lookup_sql = format!(
        "SELECT id FROM {} WHERE {} IN ({})",
        vocabulary.table, vocabulary.column, placeholders
    );
    let mut stmt = conn
        .prepare(&lookup_sql)
        .map_err(|e| StorageError::from_sqlite(e, &format!("resolve {} ids", vocabulary.column)))?;
    let ids = stmt
        .query_map(params_from_iter(labels.iter()), |row| row.get::<_, i64>(0))
        .and_then(|rows| rows.collect::<Result<Vec<i64>, _>>())
        .map_err(|e| StorageError::from_sqlite(e, &format!("resolve {} ids", vocabulary.column)))?;

    let link_sql = format!(
        "INSERT OR IGNORE INTO {} (unit_id, {}) VALUES (?1, ?2)",
        vocabulary.junction, vocabulary.foreign_key
    );
    let mut written = 0;
    for id in &ids {
        written += conn
            .execute(&link_sql, params![unit_id, id])
            .map_err(|e| StorageError::from_sqlite(e, &format!("link {}", vocabulary.column)))?;
    }

    debug!(unit_id, table = vocabulary.junction, rows = written, "Linked labels");
    Ok(written)
}

pub(crate) fn insert_single(
    conn: &Connection,
    unit_id: i64,
    fact: &SingleValueFact,
    value: &str,
) -> Result<(), StorageError> {
    let sql = format!(
        "INSERT INTO {} (unit_id, {}) VALUES (?1, ?2)",
        fact.table, fact.column
    );
    conn.execute(&sql, params![unit_id, value]).map_err(|e| {
        StorageError::from_sqlite(e, &format!("insert {} '{}'", fact.column, value))
    })?;
    debug!(unit_id, column = fact.column, value, "Inserted fact");
    Ok(())
}

/// One page_metadata row: model name plus every page column present in `fields`.
pub(crate) fn insert_page_metadata(
    conn: &Connection,
    unit_id: i64,
    model: &str,
    fields: &AnalysisFields,
) -> Result<(), StorageError> {
    let columns = PAGE_COLUMNS.join(", ");
    let placeholders: Vec<String> = (3..3 + PAGE_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect();
    let sql = format!(
        "INSERT INTO page_metadata (unit_id, model, {}) VALUES (?1, ?2, {})",
        columns,
        placeholders.join(", ")
    );

    let mut values = vec![Value::Integer(unit_id), Value::Text(model.to_string())];
    values.extend(PAGE_COLUMNS.iter().map(|column| match fields.text(column) {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }));

    conn.execute(&sql, params_from_iter(values.iter()))
        .map_err(|e| StorageError::from_sqlite(e, "insert page metadata"))?;
    debug!(unit_id, model, "Inserted page metadata");
    Ok(())
}

pub(crate) fn record_analysis(
    conn: &Connection,
    unit_id: i64,
    schema_name: &str,
    preset: &str,
    analyzed_at: i64,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO analyses (unit_id, schema_name, preset_name, analyzed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![unit_id, schema_name, preset, analyzed_at],
    )
    .map_err(|e| StorageError::from_sqlite(e, "record analysis"))?;
    Ok(())
}
