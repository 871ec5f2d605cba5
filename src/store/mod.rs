//! Result Store
//!
//! Durable home of extracted facts, terminal failure markers and per-preset
//! counters. Every write to those tables goes through [`ResultStore`].

pub mod database;
mod facts;
pub mod persistence;
pub mod schema;

pub use database::Database;
pub use persistence::SqliteResultStore;

use crate::analysis::{AnalysisFields, AnalysisSchema};
use crate::error::StorageError;
use serde::{Deserialize, Serialize};

/// One unit's parsed answer, ready to be written.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRecord<'a> {
    pub unit_id: i64,
    pub schema: AnalysisSchema,
    pub fields: &'a AnalysisFields,
    /// Preset that produced the answer
    pub preset: &'a str,
    /// Model behind the preset; stored with page metadata
    pub model: &'a str,
}

/// Aggregate counters for one preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetStats {
    pub preset_name: String,
    pub success_count: i64,
    pub failure_count: i64,
    pub retry_error_count: i64,
}

/// Which preset counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetCounter {
    Success,
    Failure,
    RetryError,
}

impl PresetCounter {
    pub(crate) fn column(self) -> &'static str {
        match self {
            PresetCounter::Success => "success_count",
            PresetCounter::Failure => "failure_count",
            PresetCounter::RetryError => "retry_error_count",
        }
    }
}

/// Result Store interface
pub trait ResultStore: Send + Sync {
    /// Write all facts for one unit in a single transaction and record the unit
    /// as analyzed. Nothing is written if any step fails.
    fn persist(&self, record: &AnalysisRecord<'_>) -> Result<(), StorageError>;

    /// Mark a unit as permanently failed. Returns false if it was already marked.
    fn mark_failed(&self, unit_id: i64) -> Result<bool, StorageError>;

    fn increment(&self, preset: &str, counter: PresetCounter) -> Result<(), StorageError>;

    fn increment_success(&self, preset: &str) -> Result<(), StorageError> {
        self.increment(preset, PresetCounter::Success)
    }

    fn increment_failure(&self, preset: &str) -> Result<(), StorageError> {
        self.increment(preset, PresetCounter::Failure)
    }

    fn increment_retry_error(&self, preset: &str) -> Result<(), StorageError> {
        self.increment(preset, PresetCounter::RetryError)
    }

    /// All preset counters, ordered by preset name.
    fn preset_stats(&self) -> Result<Vec<PresetStats>, StorageError>;
}
