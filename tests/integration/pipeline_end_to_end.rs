//! Per-unit pipeline: generation, parsing, journaling and persistence against a
//! real SQLite store.

use super::support::*;
use gleaner::analysis::{AnalysisSchema, InputUnit};
use gleaner::error::{AnalyzerError, ErrorClass};
use gleaner::journal::AnalysisJournal;
use gleaner::pipeline::UnitOutcome;
use gleaner::store::{ResultStore, SqliteResultStore};
use std::sync::Arc;
use tempfile::TempDir;

fn unit(id: i64, body: &str) -> InputUnit {
    InputUnit {
        id,
        group_key: None,
        body: body.to_string(),
    }
}

#[tokio::test]
async fn test_answer_is_persisted_and_counted() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "My heater is broken again")]);
    let backend = Arc::new(ScriptedBackend::new(vec![answer(
        "<sentiments>Angry, Frustrated</sentiments><urgency>high</urgency>",
    )]));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let pipeline = pipeline(backend.clone(), store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(1, "My heater is broken again")).await.unwrap();

    assert_eq!(
        outcome,
        UnitOutcome::Committed {
            preset: PRIMARY.to_string()
        }
    );
    assert_eq!(count(&db, "SELECT COUNT(*) FROM sentiments"), 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM unit_sentiments WHERE unit_id = 1"), 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM unit_urgencies WHERE unit_id = 1"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses WHERE unit_id = 1"), 1);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM sentiments WHERE sentiment IN ('angry', 'frustrated')"),
        2
    );
    assert_eq!(stats_for(store.as_ref(), PRIMARY).success_count, 1);
    assert_eq!(backend.texts(), vec!["My heater is broken again".to_string()]);
}

#[tokio::test]
async fn test_escalates_to_fallback_on_third_attempt() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![
        Step::Fail("timeout".to_string()),
        Step::Fail("timeout".to_string()),
        answer("<urgency>low</urgency>"),
    ]));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let pipeline = pipeline(backend.clone(), store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(7, "Call me back")).await.unwrap();

    assert_eq!(backend.presets(), vec![PRIMARY, PRIMARY, FALLBACK]);
    assert_eq!(
        outcome,
        UnitOutcome::Committed {
            preset: FALLBACK.to_string()
        }
    );
    let primary = stats_for(store.as_ref(), PRIMARY);
    assert_eq!(primary.retry_error_count, 2);
    assert_eq!(primary.success_count, 0);
    assert_eq!(stats_for(store.as_ref(), FALLBACK).success_count, 1);
}

#[tokio::test]
async fn test_exhausted_generation_marks_unit_failed() {
    let db = memory_db();
    let steps = (0..5).map(|_| Step::Fail("model overloaded".to_string())).collect();
    let backend = Arc::new(ScriptedBackend::new(steps));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let pipeline = pipeline(backend.clone(), store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(3, "Hello?")).await.unwrap();

    assert!(matches!(outcome, UnitOutcome::Failed { kind: "generation", .. }));
    assert_eq!(backend.presets().len(), 5);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units WHERE unit_id = 3"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 0);

    let primary = stats_for(store.as_ref(), PRIMARY);
    let fallback = stats_for(store.as_ref(), FALLBACK);
    assert_eq!(primary.retry_error_count, 2);
    assert_eq!(fallback.retry_error_count, 3);
    assert_eq!(fallback.failure_count, 1);
    assert_eq!(primary.failure_count, 0);
}

#[tokio::test]
async fn test_unparseable_answers_are_retried_then_failed() {
    let db = memory_db();
    let mut steps: Vec<Step> = (0..4)
        .map(|_| Step::Answer("I cannot help with that.".to_string()))
        .collect();
    steps.push(Step::Answer("<analysis><urgency>low</urgency>".to_string()));
    let backend = Arc::new(ScriptedBackend::new(steps));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let pipeline = pipeline(backend, store, AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(4, "...")).await.unwrap();

    assert!(matches!(outcome, UnitOutcome::Failed { kind: "parse", .. }));
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units"), 1);
}

#[tokio::test]
async fn test_rejected_value_rolls_back_and_marks_failed() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer(
        "<sentiments>calm</sentiments><urgency>urgent</urgency>",
    )]));
    let store = Arc::new(FlakyStore::new(db.clone(), 0));
    let pipeline = pipeline(backend.clone(), store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(5, "Please hurry")).await.unwrap();

    assert!(matches!(
        outcome,
        UnitOutcome::Failed {
            kind: "data_validation",
            ..
        }
    ));
    // not retried: one generation, one persist attempt
    assert_eq!(backend.presets().len(), 1);
    assert_eq!(store.persist_calls(), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM sentiments"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM unit_sentiments"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units WHERE unit_id = 5"), 1);
    assert_eq!(stats_for(store.as_ref(), PRIMARY).failure_count, 1);
}

#[tokio::test]
async fn test_storage_fault_is_retried_without_regenerating() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer("<urgency>medium</urgency>")]));
    let store = Arc::new(FlakyStore::new(db.clone(), 2));
    let pipeline = pipeline(backend.clone(), store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(6, "Leaky faucet")).await.unwrap();

    assert!(matches!(outcome, UnitOutcome::Committed { .. }));
    assert_eq!(store.persist_calls(), 3);
    assert_eq!(backend.presets().len(), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM unit_urgencies WHERE unit_id = 6"), 1);
}

#[tokio::test]
async fn test_persistent_storage_fault_is_fatal() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer("<urgency>medium</urgency>")]));
    let store = Arc::new(FlakyStore::new(db.clone(), 3));
    let pipeline = pipeline(backend, store.clone(), AnalysisSchema::Voicemail);

    let err = pipeline.process(&unit(8, "Leaky faucet")).await.unwrap_err();

    assert!(matches!(err, AnalyzerError::Storage(_)));
    assert_eq!(store.persist_calls(), 3);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 0);
}

#[tokio::test]
async fn test_page_answer_writes_metadata_row() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer(
        "<entity_class>city</entity_class><geo_focus>local</geo_focus>\
         <temporal_era>modern</temporal_era><domain>geography</domain>\
         <contains_dates>yes</contains_dates><contains_coordinates>yes</contains_coordinates>\
         <has_see_also>no</has_see_also><notes>ignored</notes>",
    )]));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let pipeline = pipeline(backend.clone(), store, AnalysisSchema::Page);

    let outcome = pipeline.process(&unit(11, "Springfield is a city.")).await.unwrap();

    assert!(matches!(outcome, UnitOutcome::Committed { .. }));
    assert_eq!(
        count(
            &db,
            "SELECT COUNT(*) FROM page_metadata WHERE unit_id = 11 AND entity_class = 'city' AND model = 'test-model'"
        ),
        1
    );
    assert_eq!(backend.texts(), vec!["Springfield is a city.".to_string()]);
}

#[tokio::test]
async fn test_journal_records_each_analysis() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analysis.log");
    let journal = Arc::new(AnalysisJournal::open(&path).unwrap());

    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer(
        "<reasoning>Tenant sounds upset & cold</reasoning><sentiments>upset</sentiments><urgency>high</urgency>",
    )]));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db));
    let pipeline =
        pipeline(backend, store, AnalysisSchema::Voicemail).with_journal(Some(journal));

    pipeline.process(&unit(21, "No heat in 4B")).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("Starting at: "));
    assert!(contents.contains("ID: 21"));
    assert!(contents.contains("No heat in 4B"));
    assert!(contents.contains("Tenant sounds upset & cold"));
    assert!(contents.contains("Urgency: high"));
}

#[tokio::test]
async fn test_transient_mark_failed_faults_still_mark_the_unit() {
    let db = memory_db();
    let steps = (0..5).map(|_| Step::Fail("model overloaded".to_string())).collect();
    let backend = Arc::new(ScriptedBackend::new(steps));
    let store = Arc::new(FlakyStore::new(db.clone(), 0).with_mark_faults(2));
    let pipeline = pipeline(backend, store.clone(), AnalysisSchema::Voicemail);

    let outcome = pipeline.process(&unit(31, "Hello?")).await.unwrap();

    assert!(matches!(outcome, UnitOutcome::Failed { kind: "generation", .. }));
    assert_eq!(store.mark_calls(), 3);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units WHERE unit_id = 31"), 1);
    assert_eq!(stats_for(store.as_ref(), FALLBACK).failure_count, 1);
}

#[tokio::test]
async fn test_exhausted_mark_failed_budget_is_fatal() {
    let db = memory_db();
    let backend = Arc::new(ScriptedBackend::new(vec![answer("<urgency>someday</urgency>")]));
    let store = Arc::new(FlakyStore::new(db.clone(), 0).with_mark_faults(3));
    let pipeline = pipeline(backend, store.clone(), AnalysisSchema::Voicemail);

    let err = pipeline.process(&unit(32, "Whenever")).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Storage);
    assert!(!err.is_classified());
    assert_eq!(store.mark_calls(), 3);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units"), 0);
    assert_eq!(stats_for(store.as_ref(), PRIMARY).failure_count, 0);
}
