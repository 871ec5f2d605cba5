//! CLI presentation: text and json formatters.

use crate::batch::RunSummary;
use crate::error::AnalyzerError;
use crate::store::PresetStats;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;

pub fn format_stats_text(stats: &[PresetStats]) -> String {
    if stats.is_empty() {
        return "No preset statistics recorded yet.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Preset", "Success", "Failure", "Retry errors"]);
    for s in stats {
        table.add_row(vec![
            s.preset_name.clone(),
            s.success_count.to_string(),
            s.failure_count.to_string(),
            s.retry_error_count.to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_stats_json(stats: &[PresetStats]) -> Result<String, AnalyzerError> {
    serde_json::to_string_pretty(stats)
        .map_err(|e| AnalyzerError::ConfigError(format!("Failed to serialize stats: {}", e)))
}

pub fn format_run_summary(summary: &RunSummary) -> String {
    format!(
        "Processed {} units ({} committed, {} failed)",
        summary.processed(),
        summary.committed,
        summary.failed
    )
}
