//! Batch loop: selection, limits, stop handling and fatal aborts.

use super::support::*;
use gleaner::analysis::AnalysisSchema;
use gleaner::batch::{BatchRunner, BatchSettings, LoopState, StopFlag};
use gleaner::error::AnalyzerError;
use gleaner::retry::RetryPolicy;
use gleaner::source::SqliteUnitSource;
use gleaner::store::{Database, ResultStore, SqliteResultStore};
use std::sync::Arc;
use std::time::Duration;

fn runner(
    db: &Arc<Database>,
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn ResultStore>,
    settings: BatchSettings,
    stop: StopFlag,
) -> BatchRunner {
    let source = Arc::new(SqliteUnitSource::new(db.clone(), Vec::new()));
    BatchRunner::new(
        source,
        pipeline(backend, store, AnalysisSchema::Voicemail),
        settings,
        stop,
    )
    .with_selection_policy(RetryPolicy::selection(Duration::ZERO))
}

fn settings(batch_size: usize, limit: usize) -> BatchSettings {
    BatchSettings {
        batch_size,
        limit,
        pause: Duration::ZERO,
    }
}

fn answers(n: usize) -> Vec<Step> {
    (0..n).map(|_| answer("<urgency>low</urgency>")).collect()
}

#[tokio::test]
async fn test_limit_larger_than_backlog_processes_everything_once() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b"), (3, None, "c")]);
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend.clone(), store, settings(1000, 5), StopFlag::new());

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.processed(), 3);
    assert_eq!(summary.committed, 3);
    assert_eq!(backend.texts(), vec!["a", "b", "c"]);
    assert_eq!(runner.state(), LoopState::Idle);

    let again = runner.run_until_limit_or_exhausted().await.unwrap();
    assert_eq!(again.processed(), 0);
}

#[tokio::test]
async fn test_limit_caps_units_across_windows() {
    let db = memory_db();
    seed_units(
        &db,
        &[(1, None, "a"), (2, None, "b"), (3, None, "c"), (4, None, "d"), (5, None, "e")],
    );
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend.clone(), store, settings(2, 3), StopFlag::new());

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.processed(), 3);
    assert_eq!(backend.texts(), vec!["a", "b", "c"]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 3);
}

#[tokio::test]
async fn test_rejected_unit_does_not_stop_the_batch() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b"), (3, None, "c")]);
    let backend = Arc::new(ScriptedBackend::new(vec![
        answer("<urgency>low</urgency>"),
        answer("<urgency>whenever</urgency>"),
        answer("<urgency>critical</urgency>"),
    ]));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend, store, settings(1000, 0), StopFlag::new());

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.committed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units WHERE unit_id = 2"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 2);
}

#[tokio::test]
async fn test_excluded_group_keys_are_skipped() {
    let db = memory_db();
    seed_units(&db, &[(1, Some(10), "a"), (2, Some(20), "b"), (3, None, "c"), (4, None, "  ")]);
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let source = Arc::new(SqliteUnitSource::new(db.clone(), vec![20]));
    let mut runner = BatchRunner::new(
        source,
        pipeline(backend.clone(), store, AnalysisSchema::Voicemail),
        settings(1000, 0),
        StopFlag::new(),
    );

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.processed(), 2);
    assert_eq!(backend.texts(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_stop_finishes_current_unit_only() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b"), (3, None, "c")]);
    let stop = StopFlag::new();
    let backend = Arc::new(ScriptedBackend::new(answers(10)).raising(stop.clone()));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend.clone(), store, settings(1000, 0), stop);

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.committed, 1);
    assert_eq!(backend.texts(), vec!["a"]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM analyses"), 1);
    assert_eq!(runner.state(), LoopState::Idle);
}

#[tokio::test]
async fn test_stop_before_start_processes_nothing() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a")]);
    let stop = StopFlag::new();
    stop.raise();
    let backend = Arc::new(ScriptedBackend::new(answers(1)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend.clone(), store, settings(1000, 0), stop);

    let summary = runner.run_continuous(Duration::from_secs(60)).await.unwrap();

    assert_eq!(summary.processed(), 0);
    assert!(backend.texts().is_empty());
}

#[tokio::test]
async fn test_continuous_mode_exits_promptly_when_stopped() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b")]);
    let stop = StopFlag::new();
    let backend = Arc::new(ScriptedBackend::new(answers(10)).raising(stop.clone()));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend, store, settings(1000, 0), stop);

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run_continuous(Duration::from_secs(3600)),
    )
    .await
    .expect("continuous run did not stop")
    .unwrap();

    assert_eq!(summary.committed, 1);
}

#[tokio::test]
async fn test_fatal_storage_fault_aborts_the_run() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b")]);
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store = Arc::new(FlakyStore::new(db.clone(), 100));
    let mut runner = runner(&db, backend.clone(), store, settings(1000, 0), StopFlag::new());

    let result = runner.run_until_limit_or_exhausted().await;

    assert!(result.is_err());
    assert_eq!(backend.texts(), vec!["a"]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM failed_units"), 0);
}

#[tokio::test]
async fn test_transient_selection_fault_is_retried() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a"), (2, None, "b")]);
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let source = Arc::new(FlakySource::new(db.clone(), 1));
    let mut runner = BatchRunner::new(
        source.clone(),
        pipeline(backend.clone(), store, AnalysisSchema::Voicemail),
        settings(1000, 0),
        StopFlag::new(),
    )
    .with_selection_policy(RetryPolicy::selection(Duration::ZERO));

    let summary = runner.run_until_limit_or_exhausted().await.unwrap();

    assert_eq!(summary.committed, 2);
    assert_eq!(backend.texts(), vec!["a", "b"]);
    // failed read, successful read, then the empty read that ends the pass
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_persistent_selection_fault_ends_the_run() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "a")]);
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let source = Arc::new(FlakySource::new(db.clone(), 3));
    let mut runner = BatchRunner::new(
        source.clone(),
        pipeline(backend.clone(), store, AnalysisSchema::Voicemail),
        settings(1000, 0),
        StopFlag::new(),
    )
    .with_selection_policy(RetryPolicy::selection(Duration::ZERO));

    let err = runner.run_until_limit_or_exhausted().await.unwrap_err();

    assert!(matches!(err, AnalyzerError::Storage(_)));
    assert_eq!(source.calls(), 3);
    assert!(backend.texts().is_empty());
}

#[tokio::test]
async fn test_continuous_mode_picks_up_units_added_between_passes() {
    let db = memory_db();
    seed_units(&db, &[(1, None, "first")]);
    let stop = StopFlag::new();
    let backend = Arc::new(ScriptedBackend::new(answers(10)));
    let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
    let mut runner = runner(&db, backend.clone(), store, settings(1000, 0), stop.clone());

    let feeder = async {
        while count(&db, "SELECT COUNT(*) FROM analyses") < 1 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        seed_units(&db, &[(2, None, "second")]);
        while count(&db, "SELECT COUNT(*) FROM analyses") < 2 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        stop.raise();
    };

    let (summary, _) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(runner.run_continuous(Duration::from_millis(20)), feeder) },
    )
    .await
    .expect("continuous run did not stop");

    assert_eq!(summary.unwrap().committed, 2);
    assert_eq!(backend.texts(), vec!["first", "second"]);
    assert_eq!(runner.state(), LoopState::Idle);
}
