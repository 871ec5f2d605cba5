//! Analysis journal: a human-readable, append-only record of every analyzed
//! unit, kept apart from the diagnostic log.

use crate::analysis::{AnalysisFields, AnalysisSchema, PAGE_COLUMNS};
use crate::error::AnalyzerError;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const RULE: &str =
    "###############################################################################";

const VOICEMAIL_LINES: &[(&str, &str)] = &[
    ("Sentiments", "sentiments"),
    ("Categories", "categories"),
    ("Urgency", "urgency"),
    ("Caller type", "caller_type"),
    ("Language", "language"),
];

pub struct AnalysisJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl AnalysisJournal {
    /// Open `path` for append and write the session header.
    pub fn open(path: &Path) -> Result<Self, AnalyzerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AnalyzerError::Journal(format!(
                    "Failed to open analysis log {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "Starting at: {}\n", started).map_err(|e| {
            AnalyzerError::Journal(format!("Failed to write analysis log header: {}", e))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(
        &self,
        unit_id: i64,
        schema: AnalysisSchema,
        text: &str,
        fields: &AnalysisFields,
    ) -> Result<(), AnalyzerError> {
        let entry = format_entry(unit_id, schema, text, fields);
        let mut file = self.file.lock();
        file.write_all(entry.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| {
                AnalyzerError::Journal(format!(
                    "Failed to append to analysis log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        debug!(unit_id, path = %self.path.display(), "Journaled analysis");
        Ok(())
    }
}

fn field_text(fields: &AnalysisFields, key: &str) -> String {
    fields.get(key).map(|value| value.to_string()).unwrap_or_default()
}

fn format_entry(
    unit_id: i64,
    schema: AnalysisSchema,
    text: &str,
    fields: &AnalysisFields,
) -> String {
    let heading = match schema {
        AnalysisSchema::Voicemail => "Transcription",
        AnalysisSchema::Page => "Article",
    };

    let mut entry = format!(
        "\n{rule}\nID: {unit_id}\n\n{heading}:\n{text}\n\n",
        rule = RULE,
        unit_id = unit_id,
        heading = heading,
        text = text
    );

    match schema {
        AnalysisSchema::Voicemail => {
            entry.push_str(&format!("Reasoning:\n{}\n\n", field_text(fields, "reasoning")));
            for (label, key) in VOICEMAIL_LINES {
                entry.push_str(&format!("{}: {}\n", label, field_text(fields, key)));
            }
        }
        AnalysisSchema::Page => {
            for key in PAGE_COLUMNS {
                entry.push_str(&format!("{}: {}\n", key, field_text(fields, key)));
            }
        }
    }

    entry.push_str(RULE);
    entry.push('\n');
    entry
}
