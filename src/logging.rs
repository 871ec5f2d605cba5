//! Logging System
//!
//! Structured diagnostic logging with `tracing`. Level, format and destination
//! come from configuration; `GLEANER_LOG` overrides the filter entirely.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_ENV_VAR: &str = "GLEANER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    pub level: String,

    pub format: LogFormat,

    pub output: LogOutput,

    /// Log file path when `output = "file"`
    pub file: PathBuf,

    /// Colored output (text format on a terminal stream only)
    pub color: bool,

    /// Per-module levels, e.g. `gleaner::store = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            file: PathBuf::from("gleaner.log"),
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Initialize the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AnalyzerError> {
    let filter = build_env_filter(config)?;
    let (writer, ansi) = build_writer(config)?;

    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    let result = match config.format {
        LogFormat::Json => Registry::default().with(filter).with(layer.json()).try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(layer.with_ansi(ansi))
            .try_init(),
    };
    result.map_err(|e| AnalyzerError::ConfigError(format!("Failed to initialize logging: {}", e)))
}

fn build_writer(config: &LoggingConfig) -> Result<(BoxMakeWriter, bool), AnalyzerError> {
    match config.output {
        LogOutput::Stdout => Ok((BoxMakeWriter::new(std::io::stdout), config.color)),
        LogOutput::Stderr => Ok((BoxMakeWriter::new(std::io::stderr), config.color)),
        LogOutput::File => {
            if let Some(parent) = config.file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AnalyzerError::ConfigError(format!("Failed to create log directory: {}", e))
                    })?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file)
                .map_err(|e| {
                    AnalyzerError::ConfigError(format!(
                        "Failed to open log file {}: {}",
                        config.file.display(),
                        e
                    ))
                })?;
            Ok((BoxMakeWriter::new(Arc::new(file)), false))
        }
    }
}

/// Build the filter: `GLEANER_LOG` if set, otherwise level plus module directives.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, AnalyzerError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
        return Ok(filter);
    }
    filter_from_config(config)
}

fn filter_from_config(config: &LoggingConfig) -> Result<EnvFilter, AnalyzerError> {
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::try_new(&config.level).map_err(|e| {
        AnalyzerError::ConfigError(format!("Invalid log level '{}': {}", config.level, e))
    })?;
    for (module, module_level) in &config.modules {
        let directive = format!("{}={}", module, module_level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| AnalyzerError::ConfigError(format!("Invalid log directive: {}", e)))?,
        );
    }
    Ok(filter)
}
