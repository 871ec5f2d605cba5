//! CLI parse: clap types for Gleaner. No behavior; definitions only.

use crate::analysis::AnalysisSchema;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Gleaner CLI - LLM-driven fact extraction into SQLite
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(about = "Analyze free-text records with a language model and store the extracted facts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (default: ./gleaner.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides [database] path)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze pending input units
    Run(RunArgs),
    /// Load input units from a JSON Lines file ({"id", "group_key"?, "text"} per line)
    Ingest {
        /// JSON Lines file to import
        file: PathBuf,
    },
    /// Show per-preset success, failure and retry counters
    Stats {
        #[arg(long, value_enum, default_value = "text")]
        format: StatsFormat,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Maximum number of units to process (0 = unlimited)
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Seconds to pause between units (fractions allowed, e.g. 0.5)
    #[arg(long, short = 'p')]
    pub pause: Option<f64>,

    /// Run continuously, sleeping this many seconds between passes
    #[arg(long, short = 'c', value_name = "SECS")]
    pub continuous: Option<u64>,

    /// Append a human-readable record of each analysis to this file
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Primary preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Preset used after repeated failures on a unit
    #[arg(long)]
    pub fallback_preset: Option<String>,

    /// Template file name inside the templates directory
    #[arg(long)]
    pub template: Option<String>,

    /// Analysis schema (voicemail, page)
    #[arg(long)]
    pub schema: Option<AnalysisSchema>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    Text,
    Json,
}
