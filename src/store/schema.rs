//! Durable schema: vocabulary, junction, single-value fact, page metadata, failure
//! marker and preset counter tables.
//!
//! Closed enumerations live here once and are rendered into CHECK constraints, so the
//! storage layer is the single authority on which generated values are acceptable.

use crate::error::StorageError;
use rusqlite::Connection;

pub const URGENCY_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

pub const CALLER_TYPES: &[&str] = &[
    "resident",
    "prospective_resident",
    "former_resident",
    "vendor",
    "owner",
    "other",
];

pub const ENTITY_CLASSES: &[&str] = &[
    "person",
    "country",
    "city",
    "historical_event",
    "holiday",
    "concept",
    "biological_species",
    "organization",
    "work_of_art",
    "technology",
    "other",
];

pub const GEO_FOCI: &[&str] = &["global", "continent", "country", "sub_national", "local", "none"];

pub const TEMPORAL_ERAS: &[&str] = &[
    "pre_history",
    "classical",
    "medieval",
    "early_modern",
    "modern",
    "contemporary",
    "none",
];

pub const DOMAINS: &[&str] = &[
    "geography",
    "politics",
    "science",
    "arts",
    "religion",
    "technology",
    "economics",
    "sports",
    "history",
    "culture",
    "other",
];

pub const YES_NO: &[&str] = &["yes", "no"];

/// A label dictionary and the junction table linking units to it.
#[derive(Debug, Clone, Copy)]
pub struct LabelVocabulary {
    /// Field key in `AnalysisFields`
    pub field: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub junction: &'static str,
    pub foreign_key: &'static str,
}

pub const SENTIMENTS: LabelVocabulary = LabelVocabulary {
    field: "sentiments",
    table: "sentiments",
    column: "sentiment",
    junction: "unit_sentiments",
    foreign_key: "sentiment_id",
};

pub const CATEGORIES: LabelVocabulary = LabelVocabulary {
    field: "categories",
    table: "categories",
    column: "category",
    junction: "unit_categories",
    foreign_key: "category_id",
};

/// A per-unit single-value fact table.
#[derive(Debug, Clone, Copy)]
pub struct SingleValueFact {
    pub field: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    /// Closed enumeration enforced by CHECK, if any
    pub allowed: Option<&'static [&'static str]>,
}

pub const URGENCY: SingleValueFact = SingleValueFact {
    field: "urgency",
    table: "unit_urgencies",
    column: "urgency",
    allowed: Some(URGENCY_LEVELS),
};

pub const CALLER_TYPE: SingleValueFact = SingleValueFact {
    field: "caller_type",
    table: "unit_caller_types",
    column: "caller_type",
    allowed: Some(CALLER_TYPES),
};

pub const LANGUAGE: SingleValueFact = SingleValueFact {
    field: "language",
    table: "unit_languages",
    column: "language",
    allowed: None,
};

pub const VOICEMAIL_LABELS: &[LabelVocabulary] = &[SENTIMENTS, CATEGORIES];
pub const VOICEMAIL_SINGLES: &[SingleValueFact] = &[URGENCY, CALLER_TYPE, LANGUAGE];

/// Enumerations for the page metadata columns, in `PAGE_COLUMNS` order.
pub const PAGE_ENUMERATIONS: &[(&str, &[&str])] = &[
    ("entity_class", ENTITY_CLASSES),
    ("geo_focus", GEO_FOCI),
    ("temporal_era", TEMPORAL_ERAS),
    ("domain", DOMAINS),
    ("contains_dates", YES_NO),
    ("contains_coordinates", YES_NO),
    ("has_see_also", YES_NO),
];

fn check_clause(column: &str, allowed: &[&str]) -> String {
    let values: Vec<String> = allowed.iter().map(|v| format!("'{}'", v)).collect();
    format!("CHECK({} IN ({}))", column, values.join(", "))
}

fn label_tables_sql(vocabulary: &LabelVocabulary) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    {column} TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS {junction} (
    unit_id INTEGER NOT NULL,
    {foreign_key} INTEGER NOT NULL REFERENCES {table}(id),
    UNIQUE(unit_id, {foreign_key})
);
",
        table = vocabulary.table,
        column = vocabulary.column,
        junction = vocabulary.junction,
        foreign_key = vocabulary.foreign_key,
    )
}

fn single_fact_sql(fact: &SingleValueFact) -> String {
    let check = fact
        .allowed
        .map(|allowed| format!(" {}", check_clause(fact.column, allowed)))
        .unwrap_or_default();
    format!(
        "
CREATE TABLE IF NOT EXISTS {table} (
    unit_id INTEGER NOT NULL,
    {column} TEXT NOT NULL{check}
);

CREATE INDEX IF NOT EXISTS idx_{table}_unit ON {table}(unit_id);
",
        table = fact.table,
        column = fact.column,
        check = check,
    )
}

fn page_metadata_sql() -> String {
    let columns: Vec<String> = PAGE_ENUMERATIONS
        .iter()
        .map(|(column, allowed)| format!("    {} TEXT {}", column, check_clause(column, allowed)))
        .collect();
    format!(
        "
CREATE TABLE IF NOT EXISTS page_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    unit_id INTEGER NOT NULL,
    model TEXT,
{}
);

CREATE INDEX IF NOT EXISTS idx_page_metadata_unit ON page_metadata(unit_id);
",
        columns.join(",\n")
    )
}

const BASE_SQL: &str = r#"
-- Source-of-record for input text. Populated by `gleaner ingest`.
CREATE TABLE IF NOT EXISTS input_units (
    id INTEGER PRIMARY KEY,
    group_key INTEGER,
    body TEXT
);

-- One row per unit whose facts were committed.
CREATE TABLE IF NOT EXISTS analyses (
    unit_id INTEGER PRIMARY KEY,
    schema_name TEXT NOT NULL,
    preset_name TEXT NOT NULL,
    analyzed_at INTEGER NOT NULL
);

-- Units that permanently failed analysis; never selected again.
CREATE TABLE IF NOT EXISTS failed_units (
    unit_id INTEGER PRIMARY KEY,
    failed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS preset_stats (
    preset_name TEXT PRIMARY KEY,
    success_count INTEGER NOT NULL DEFAULT 0 CHECK(success_count >= 0),
    failure_count INTEGER NOT NULL DEFAULT 0 CHECK(failure_count >= 0),
    retry_error_count INTEGER NOT NULL DEFAULT 0 CHECK(retry_error_count >= 0)
);
"#;

/// Full schema DDL.
pub fn schema_sql() -> String {
    let mut sql = String::from(BASE_SQL);
    for vocabulary in VOICEMAIL_LABELS {
        sql.push_str(&label_tables_sql(vocabulary));
    }
    for fact in VOICEMAIL_SINGLES {
        sql.push_str(&single_fact_sql(fact));
    }
    sql.push_str(&page_metadata_sql());
    sql
}

/// Apply connection pragmas.
pub fn apply_pragmas(conn: &Connection, file_backed: bool) -> Result<(), StorageError> {
    let journal = if file_backed {
        "PRAGMA journal_mode = WAL;\n"
    } else {
        ""
    };
    conn.execute_batch(&format!(
        "{}PRAGMA synchronous = NORMAL;\nPRAGMA busy_timeout = 5000;\nPRAGMA foreign_keys = ON;",
        journal
    ))
    .map_err(|e| StorageError::from_sqlite(e, "apply pragmas"))
}

/// Create all tables and indexes if they do not exist.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&schema_sql())
        .map_err(|e| StorageError::from_sqlite(e, "create schema"))
}
