//! Result store against a file-backed database.

use super::support::*;
use gleaner::analysis::{AnalysisFields, AnalysisSchema, FieldValue, LabelSet};
use gleaner::source::{SqliteUnitSource, UnitSource};
use gleaner::store::{AnalysisRecord, Database, ResultStore, SqliteResultStore};
use std::sync::Arc;
use tempfile::TempDir;

fn voicemail_fields(sentiments: &str, urgency: &str) -> AnalysisFields {
    let mut fields = AnalysisFields::new();
    fields.insert("sentiments", FieldValue::Labels(LabelSet::from_csv(sentiments)));
    fields.insert("urgency", FieldValue::Text(urgency.to_string()));
    fields
}

#[test]
fn test_mark_failed_twice_leaves_one_row() {
    let db = memory_db();
    let store = SqliteResultStore::new(db.clone());

    assert!(store.mark_failed(42).unwrap());
    assert!(!store.mark_failed(42).unwrap());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units WHERE unit_id = 42"), 1);
}

#[test]
fn test_shared_vocabulary_is_reused_across_units() {
    let db = memory_db();
    let store = SqliteResultStore::new(db.clone());

    for (unit_id, sentiments) in [(1, "angry, tired"), (2, "Tired, hopeful")] {
        let fields = voicemail_fields(sentiments, "low");
        store
            .persist(&AnalysisRecord {
                unit_id,
                schema: AnalysisSchema::Voicemail,
                fields: &fields,
                preset: PRIMARY,
                model: "m",
            })
            .unwrap();
    }

    assert_eq!(count(&db, "SELECT COUNT(*) FROM sentiments"), 3);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM unit_sentiments"), 4);
}

#[test]
fn test_persisted_units_leave_the_eligible_set() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b"), (3, None, "c")]);
    let store = SqliteResultStore::new(db.clone());
    let source = SqliteUnitSource::new(db.clone(), Vec::new());

    let fields = voicemail_fields("calm", "low");
    store
        .persist(&AnalysisRecord {
            unit_id: 1,
            schema: AnalysisSchema::Voicemail,
            fields: &fields,
            preset: PRIMARY,
            model: "m",
        })
        .unwrap();
    store.mark_failed(2).unwrap();

    let ids: Vec<i64> = source.select_batch(10).unwrap().iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![3]);
}

#[test]
fn test_counters_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("gleaner.db");

    {
        let store = SqliteResultStore::new(Arc::new(Database::open(&path).unwrap()));
        store.increment_success(PRIMARY).unwrap();
        store.increment_success(PRIMARY).unwrap();
        store.increment_retry_error(FALLBACK).unwrap();
    }

    let store = SqliteResultStore::new(Arc::new(Database::open(&path).unwrap()));
    let stats = store.preset_stats().unwrap();
    let names: Vec<&str> = stats.iter().map(|s| s.preset_name.as_str()).collect();
    assert_eq!(names, vec![FALLBACK, PRIMARY]);
    assert_eq!(stats_for(&store, PRIMARY).success_count, 2);
    assert_eq!(stats_for(&store, FALLBACK).retry_error_count, 1);
}
