//! CLI domain: parse, route, output, and presentation only.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{error_chain, map_error};
pub use parse::{Cli, Commands, RunArgs, StatsFormat};
pub use presentation::{format_run_summary, format_stats_json, format_stats_text};
pub use route::{build_logging_config, RunContext};
