//! Shared fixtures: a scripted generation backend, a store that injects storage
//! faults, and helpers to seed and inspect a database.

use async_trait::async_trait;
use gleaner::analysis::{AnalysisSchema, InputUnit};
use gleaner::batch::StopFlag;
use gleaner::error::{AnalyzerError, StorageError};
use gleaner::generator::{GenerationBackend, GeneratorClient, TemplateOutcome, TemplateVariables};
use gleaner::parser::ResponseParser;
use gleaner::pipeline::{RetryPolicies, UnitPipeline};
use gleaner::source::{SqliteUnitSource, UnitSource};
use gleaner::store::{AnalysisRecord, Database, PresetCounter, PresetStats, ResultStore, SqliteResultStore};
use parking_lot::Mutex;
use rusqlite::params;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PRIMARY: &str = "primary";
pub const FALLBACK: &str = "fallback";

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum Step {
    Answer(String),
    Fail(String),
}

pub fn answer(body: &str) -> Step {
    Step::Answer(format!("Sure, here is my analysis.\n<analysis>{}</analysis>\nThanks!", body))
}

/// Replies from a fixed script in call order and records which preset each call used.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Step>>,
    presets: Mutex<Vec<String>>,
    texts: Mutex<Vec<String>>,
    raise_on_call: Option<StopFlag>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            presets: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            raise_on_call: None,
        }
    }

    /// Raise `flag` during every call, as an interrupt arriving mid-unit would.
    pub fn raising(mut self, flag: StopFlag) -> Self {
        self.raise_on_call = Some(flag);
        self
    }

    pub fn presets(&self) -> Vec<String> {
        self.presets.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn run_template(
        &self,
        _template: &str,
        variables: &TemplateVariables,
        preset: Option<&str>,
    ) -> Result<TemplateOutcome, AnalyzerError> {
        if let Some(flag) = &self.raise_on_call {
            flag.raise();
        }
        self.presets
            .lock()
            .push(preset.unwrap_or(PRIMARY).to_string());
        if let Some(text) = variables.get("transcription").or_else(|| variables.get("article_text")) {
            self.texts.lock().push(text.clone());
        }
        match self.script.lock().pop_front() {
            Some(Step::Answer(response)) => {
                Ok(TemplateOutcome::success(response, Some("test-model".to_string())))
            }
            Some(Step::Fail(message)) => Ok(TemplateOutcome::failure(message)),
            None => Ok(TemplateOutcome::failure("script exhausted")),
        }
    }

    fn default_preset(&self) -> &str {
        PRIMARY
    }
}

pub fn locked() -> StorageError {
    StorageError::Sqlite {
        message: "database is locked".to_string(),
        code: Some(5),
    }
}

/// Consume one injected fault if any are left.
fn take_fault(faults: &AtomicUsize) -> bool {
    faults
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Result store that fails the first `persist_faults` persists (and the first
/// `mark_faults` failure markings) with a generic engine error before
/// delegating to SQLite.
pub struct FlakyStore {
    inner: SqliteResultStore,
    persist_faults: AtomicUsize,
    persist_calls: AtomicUsize,
    mark_faults: AtomicUsize,
    mark_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(db: Arc<Database>, persist_faults: usize) -> Self {
        Self {
            inner: SqliteResultStore::new(db),
            persist_faults: AtomicUsize::new(persist_faults),
            persist_calls: AtomicUsize::new(0),
            mark_faults: AtomicUsize::new(0),
            mark_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_mark_faults(self, faults: usize) -> Self {
        self.mark_faults.store(faults, Ordering::SeqCst);
        self
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn mark_calls(&self) -> usize {
        self.mark_calls.load(Ordering::SeqCst)
    }
}

impl ResultStore for FlakyStore {
    fn persist(&self, record: &AnalysisRecord<'_>) -> Result<(), StorageError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.persist_faults) {
            return Err(locked());
        }
        self.inner.persist(record)
    }

    fn mark_failed(&self, unit_id: i64) -> Result<bool, StorageError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.mark_faults) {
            return Err(locked());
        }
        self.inner.mark_failed(unit_id)
    }

    fn increment(&self, preset: &str, counter: PresetCounter) -> Result<(), StorageError> {
        self.inner.increment(preset, counter)
    }

    fn preset_stats(&self) -> Result<Vec<PresetStats>, StorageError> {
        self.inner.preset_stats()
    }
}

/// Unit source whose first `faults` selections fail before delegating.
pub struct FlakySource {
    inner: SqliteUnitSource,
    faults: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakySource {
    pub fn new(db: Arc<Database>, faults: usize) -> Self {
        Self {
            inner: SqliteUnitSource::new(db, Vec::new()),
            faults: AtomicUsize::new(faults),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UnitSource for FlakySource {
    fn select_batch(&self, size: usize) -> Result<Vec<InputUnit>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_fault(&self.faults) {
            return Err(locked());
        }
        self.inner.select_batch(size)
    }
}

pub fn memory_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

pub fn seed_units(db: &Database, units: &[(i64, Option<i64>, &str)]) {
    db.with_conn(|conn| {
        for (id, group_key, body) in units {
            conn.execute(
                "INSERT INTO input_units (id, group_key, body) VALUES (?1, ?2, ?3)",
                params![id, group_key, body],
            )
            .unwrap();
        }
        Ok(())
    })
    .unwrap();
}

pub fn count(db: &Database, sql: &str) -> i64 {
    db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0)).unwrap()))
        .unwrap()
}

pub fn stats_for(store: &dyn ResultStore, preset: &str) -> PresetStats {
    store
        .preset_stats()
        .unwrap()
        .into_iter()
        .find(|s| s.preset_name == preset)
        .unwrap_or(PresetStats {
            preset_name: preset.to_string(),
            ..PresetStats::default()
        })
}

/// Pipeline with a fallback preset and no retry delays.
pub fn pipeline(
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn ResultStore>,
    schema: AnalysisSchema,
) -> UnitPipeline {
    let generator = GeneratorClient::new(backend, schema.default_template(), schema)
        .with_fallback_preset(Some(FALLBACK.to_string()));
    UnitPipeline::new(generator, ResponseParser::new(schema), store)
        .with_policies(RetryPolicies::with_delay(Duration::ZERO))
}
