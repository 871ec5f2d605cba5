//! Analysis data model
//!
//! Input units, the transient field mapping produced by the response parser, and the
//! two analysis schemas (voicemail transcriptions and encyclopedia pages).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One text record awaiting analysis. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUnit {
    pub id: i64,
    /// Secondary grouping key (e.g. the account a voicemail belongs to)
    pub group_key: Option<i64>,
    pub body: String,
}

/// Required columns of the page schema, in storage order.
pub const PAGE_COLUMNS: &[&str] = &[
    "entity_class",
    "geo_focus",
    "temporal_era",
    "domain",
    "contains_dates",
    "contains_coordinates",
    "has_see_also",
];

const VOICEMAIL_LABEL_KEYS: &[&str] = &["sentiments", "categories"];

/// Which analysis a run performs; decides parsing rules and persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSchema {
    Voicemail,
    Page,
}

impl AnalysisSchema {
    /// Keys whose values are comma-separated label lists.
    pub fn multi_valued_keys(self) -> &'static [&'static str] {
        match self {
            AnalysisSchema::Voicemail => VOICEMAIL_LABEL_KEYS,
            AnalysisSchema::Page => &[],
        }
    }

    pub fn is_multi_valued(self, key: &str) -> bool {
        self.multi_valued_keys().contains(&key)
    }

    /// Fixed key set the parsed mapping must match, if the schema has one.
    pub fn required_keys(self) -> Option<&'static [&'static str]> {
        match self {
            AnalysisSchema::Voicemail => None,
            AnalysisSchema::Page => Some(PAGE_COLUMNS),
        }
    }

    /// Template variable that carries the unit body.
    pub fn text_variable(self) -> &'static str {
        match self {
            AnalysisSchema::Voicemail => "transcription",
            AnalysisSchema::Page => "article_text",
        }
    }

    pub fn default_template(self) -> &'static str {
        match self {
            AnalysisSchema::Voicemail => "voicemail-analysis.md",
            AnalysisSchema::Page => "page-analysis.md",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisSchema::Voicemail => "voicemail",
            AnalysisSchema::Page => "page",
        }
    }
}

impl fmt::Display for AnalysisSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "voicemail" => Ok(AnalysisSchema::Voicemail),
            "page" => Ok(AnalysisSchema::Page),
            other => Err(format!(
                "Unknown analysis schema: {} (must be 'voicemail' or 'page')",
                other
            )),
        }
    }
}

/// Ordered, deduplicated set of lowercase labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    /// Split a comma-separated list, lowercasing and trimming each label.
    /// Empty pieces are skipped; the first occurrence of a label keeps its position.
    pub fn from_csv(raw: &str) -> Self {
        let mut set = LabelSet::default();
        for piece in raw.split(',') {
            set.insert(piece);
        }
        set
    }

    pub fn insert(&mut self, label: &str) -> bool {
        let normalized = label.trim().to_lowercase();
        if normalized.is_empty() || self.0.contains(&normalized) {
            return false;
        }
        self.0.push(normalized);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Labels(LabelSet),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Labels(labels) => labels.fmt(f),
        }
    }
}

/// Transient structured output of one parse. Never holds empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFields {
    values: BTreeMap<String, FieldValue>,
}

impl AnalysisFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Single-valued field text.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Multi-valued field labels.
    pub fn labels(&self, key: &str) -> Option<&LabelSet> {
        match self.values.get(key) {
            Some(FieldValue::Labels(labels)) => Some(labels),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn retain_keys(&mut self, allowed: &[&str]) {
        self.values.retain(|key, _| allowed.contains(&key.as_str()));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
