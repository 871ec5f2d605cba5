//! CLI route: builds the runtime from configuration and dispatches commands.

use crate::batch::{BatchRunner, BatchSettings, RunSummary, StopFlag};
use crate::cli::parse::{Cli, Commands, RunArgs, StatsFormat};
use crate::cli::presentation::{format_run_summary, format_stats_json, format_stats_text};
use crate::config::{ConfigLoader, GleanerConfig};
use crate::error::AnalyzerError;
use crate::generator::{GeneratorClient, ProviderBackend};
use crate::journal::AnalysisJournal;
use crate::logging::{LogFormat, LoggingConfig};
use crate::parser::ResponseParser;
use crate::pipeline::UnitPipeline;
use crate::source::{ingest_jsonl, SqliteUnitSource};
use crate::store::{Database, ResultStore, SqliteResultStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// CLI context: configuration with the global flags applied.
pub struct RunContext {
    config: GleanerConfig,
}

impl RunContext {
    /// Load configuration from `--config` or `<working_dir>/gleaner.toml`, then
    /// apply the global flags.
    pub fn new(cli: &Cli, working_dir: &Path) -> Result<Self, AnalyzerError> {
        let mut config = ConfigLoader::load(cli.config.as_deref(), working_dir)?;
        if let Some(database) = &cli.database {
            config.database.path = Some(database.clone());
        }
        Ok(Self { config })
    }

    pub fn from_config(config: GleanerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GleanerConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands, stop: StopFlag) -> Result<String, AnalyzerError> {
        match command {
            Commands::Run(args) => self.handle_run(args, stop).await,
            Commands::Ingest { file } => self.handle_ingest(file),
            Commands::Stats { format } => self.handle_stats(*format),
        }
    }

    fn open_database(&self) -> Result<Arc<Database>, AnalyzerError> {
        let path = self.config.database.resolved_path();
        info!(path = %path.display(), "Opening database");
        Ok(Arc::new(Database::open(&path)?))
    }

    async fn handle_run(&self, args: &RunArgs, stop: StopFlag) -> Result<String, AnalyzerError> {
        let mut config = self.config.clone();
        apply_run_overrides(&mut config, args);
        config.validate().map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            AnalyzerError::ConfigError(format!("Invalid configuration: {}", joined))
        })?;

        let journal = match &args.logfile {
            Some(path) => Some(Arc::new(AnalysisJournal::open(path)?)),
            None => None,
        };

        let db = self.open_database()?;
        let generation = &config.generation;
        let backend = ProviderBackend::new(
            generation.templates_dir.clone(),
            config.presets.clone(),
            generation.preset.clone(),
        )?;
        let generator = GeneratorClient::new(
            Arc::new(backend),
            generation.template_name(),
            generation.schema,
        )
        .with_fallback_preset(generation.fallback_preset.clone());

        let store: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(db.clone()));
        let pipeline = UnitPipeline::new(generator, ResponseParser::new(generation.schema), store)
            .with_journal(journal)
            .with_policies(config.retry.policies());
        let source = Arc::new(SqliteUnitSource::new(
            db,
            config.batch.excluded_group_keys.clone(),
        ));
        let settings = BatchSettings {
            batch_size: config.batch.batch_size,
            limit: config.batch.limit,
            pause: Duration::from_secs_f64(config.batch.pause_secs),
        };

        info!(
            schema = %generation.schema,
            preset = %generation.preset,
            fallback = generation.fallback_preset.as_deref().unwrap_or("none"),
            "Starting analysis run"
        );
        let mut runner = BatchRunner::new(source, pipeline, settings, stop)
            .with_selection_policy(config.retry.selection_policy());
        let summary: RunSummary = match config.batch.continuous_secs {
            Some(secs) => runner.run_continuous(Duration::from_secs(secs)).await?,
            None => runner.run_until_limit_or_exhausted().await?,
        };
        Ok(format_run_summary(&summary))
    }

    fn handle_ingest(&self, file: &Path) -> Result<String, AnalyzerError> {
        let db = self.open_database()?;
        let summary = ingest_jsonl(&db, file)?;
        Ok(format!(
            "Ingested {} units ({} already present)",
            summary.inserted, summary.skipped
        ))
    }

    fn handle_stats(&self, format: StatsFormat) -> Result<String, AnalyzerError> {
        let db = self.open_database()?;
        let stats = SqliteResultStore::new(db).preset_stats()?;
        match format {
            StatsFormat::Text => Ok(format_stats_text(&stats)),
            StatsFormat::Json => format_stats_json(&stats),
        }
    }
}

/// Command-line values for `run` take precedence over configuration.
pub fn apply_run_overrides(config: &mut GleanerConfig, args: &RunArgs) {
    if let Some(limit) = args.limit {
        config.batch.limit = limit;
    }
    if let Some(pause) = args.pause {
        config.batch.pause_secs = pause;
    }
    if args.continuous.is_some() {
        config.batch.continuous_secs = args.continuous;
    }
    if let Some(preset) = &args.preset {
        config.generation.preset = preset.clone();
    }
    if args.fallback_preset.is_some() {
        config.generation.fallback_preset = args.fallback_preset.clone();
    }
    if args.template.is_some() {
        config.generation.template = args.template.clone();
    }
    if let Some(schema) = args.schema {
        config.generation.schema = schema;
    }
}

/// Logging config from the file, with `--debug`, `--log-level` and
/// `--log-format` applied on top in that order.
pub fn build_logging_config(cli: &Cli, config: &GleanerConfig) -> Result<LoggingConfig, AnalyzerError> {
    let mut logging = config.logging.clone();
    if cli.debug {
        logging.level = "debug".to_string();
    }
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => {
                return Err(AnalyzerError::ConfigError(format!(
                    "Unknown log format '{}' (expected json or text)",
                    other
                )))
            }
        };
    }
    Ok(logging)
}
