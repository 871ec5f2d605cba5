//! Configuration System
//!
//! Layered configuration: built-in defaults, then the user config file, then the
//! project config file, then `GLEANER__SECTION__KEY` environment variables.
//! Command-line flags are applied on top by the binary.

use crate::analysis::AnalysisSchema;
use crate::logging::LoggingConfig;
use crate::pipeline::RetryPolicies;
use crate::retry::{RetryPolicy, Stage};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GleanerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    /// Named provider presets
    #[serde(default)]
    pub presets: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to the platform data dir
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_database_path)
    }
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("", "", "gleaner")
        .map(|dirs| dirs.data_dir().join("gleaner.db"))
        .unwrap_or_else(|| PathBuf::from("gleaner.db"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Template file name inside `templates_dir`; defaults per schema
    pub template: Option<String>,
    pub templates_dir: PathBuf,
    pub preset: String,
    /// Preset used once a unit has failed more than once
    pub fallback_preset: Option<String>,
    pub schema: AnalysisSchema,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            template: None,
            templates_dir: PathBuf::from("templates"),
            preset: "default".to_string(),
            fallback_preset: None,
            schema: AnalysisSchema::Voicemail,
        }
    }
}

impl GenerationConfig {
    pub fn template_name(&self) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| self.schema.default_template().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Total units per run; 0 means unlimited
    pub limit: usize,
    /// Seconds to pause after each unit; fractions allowed
    pub pause_secs: f64,
    /// Seconds between passes in continuous mode; unset runs once
    pub continuous_secs: Option<u64>,
    /// Units with these grouping keys are never selected
    pub excluded_group_keys: Vec<i64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::batch::DEFAULT_BATCH_SIZE,
            limit: 0,
            pause_secs: 0.0,
            continuous_secs: None,
            excluded_group_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub generation_attempts: u32,
    pub persistence_attempts: u32,
    pub failure_mark_attempts: u32,
    pub selection_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            generation_attempts: crate::retry::GENERATION_ATTEMPTS,
            persistence_attempts: crate::retry::PERSISTENCE_ATTEMPTS,
            failure_mark_attempts: crate::retry::FAILURE_MARK_ATTEMPTS,
            selection_attempts: crate::retry::SELECTION_ATTEMPTS,
            delay_secs: crate::retry::DEFAULT_RETRY_DELAY.as_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policies(&self) -> RetryPolicies {
        let delay = Duration::from_secs(self.delay_secs);
        RetryPolicies {
            generation: RetryPolicy::new(Stage::Generation, self.generation_attempts, delay),
            persistence: RetryPolicy::new(Stage::Persistence, self.persistence_attempts, delay),
            failure_marking: RetryPolicy::new(
                Stage::FailureMarking,
                self.failure_mark_attempts,
                delay,
            ),
        }
    }

    /// Policy for reading each window of eligible units.
    pub fn selection_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Stage::Selection,
            self.selection_attempts,
            Duration::from_secs(self.delay_secs),
        )
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Preset(String),
    Generation(String),
    Batch(String),
    Retry(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Preset(msg) => write!(f, "Preset: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Batch(msg) => write!(f, "Batch: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GleanerConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.presets.contains_key(&self.generation.preset) {
            errors.push(ValidationError::Generation(format!(
                "Preset '{}' is not defined under [presets]",
                self.generation.preset
            )));
        }
        if let Some(fallback) = &self.generation.fallback_preset {
            if !self.presets.contains_key(fallback) {
                errors.push(ValidationError::Generation(format!(
                    "Fallback preset '{}' is not defined under [presets]",
                    fallback
                )));
            }
        }
        if let Some(template) = &self.generation.template {
            if template.trim().is_empty() {
                errors.push(ValidationError::Generation(
                    "Template name cannot be empty".to_string(),
                ));
            }
        }

        let mut names: Vec<&String> = self.presets.keys().collect();
        names.sort();
        for name in names {
            for problem in self.presets[name].validate(name) {
                errors.push(ValidationError::Preset(problem));
            }
        }

        if self.batch.batch_size == 0 {
            errors.push(ValidationError::Batch(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if !self.batch.pause_secs.is_finite() || self.batch.pause_secs < 0.0 {
            errors.push(ValidationError::Batch(format!(
                "pause_secs must be a non-negative number of seconds, got {}",
                self.batch.pause_secs
            )));
        }
        if self.batch.continuous_secs == Some(0) {
            errors.push(ValidationError::Batch(
                "continuous_secs must be greater than zero".to_string(),
            ));
        }

        for (name, attempts) in [
            ("generation_attempts", self.retry.generation_attempts),
            ("persistence_attempts", self.retry.persistence_attempts),
            ("failure_mark_attempts", self.retry.failure_mark_attempts),
            ("selection_attempts", self.retry.selection_attempts),
        ] {
            if attempts == 0 {
                errors.push(ValidationError::Retry(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
