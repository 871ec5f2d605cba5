//! Error types for the Gleaner analysis pipeline.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite {
        message: String,
        /// Extended SQLite result code, when the failure came from the engine
        code: Option<i32>,
    },

    #[error("Value rejected by enumeration constraint: {0}")]
    DataValidation(String),

    #[error("Rollback failed after {cause}: {message}")]
    RollbackFailed { cause: String, message: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// Map a rusqlite failure, distinguishing CHECK constraint violations
    /// (bad generated content) from every other engine failure.
    pub fn from_sqlite(err: rusqlite::Error, context: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK {
                return StorageError::DataValidation(format!("{}: {}", context, err));
            }
            return StorageError::Sqlite {
                message: format!("{}: {}", context, err),
                code: Some(ffi_err.extended_code),
            };
        }
        StorageError::Sqlite {
            message: format!("{}: {}", context, err),
            code: None,
        }
    }
}

/// How the retry controller treats an error once a stage gives up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad or missing generated content; the unit is marked failed.
    Classified,
    /// Generic storage fault; retried, then fatal for the run.
    Storage,
    /// Anything else; aborts the run immediately.
    Fatal,
}

/// Application-level errors
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Data validation error: {0}")]
    DataValidation(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Analysis journal error: {0}")]
    Journal(String),

    #[error("Ingest error: {0}")]
    Ingest(String),
}

impl AnalyzerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AnalyzerError::Parse(_)
            | AnalyzerError::Generation(_)
            | AnalyzerError::DataValidation(_) => ErrorClass::Classified,
            AnalyzerError::Storage(StorageError::RollbackFailed { .. }) => ErrorClass::Fatal,
            AnalyzerError::Storage(_) => ErrorClass::Storage,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.class() == ErrorClass::Classified
    }

    /// Short label used in logs and stage reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::Parse(_) => "parse",
            AnalyzerError::Generation(_) => "generation",
            AnalyzerError::DataValidation(_) => "data_validation",
            AnalyzerError::Storage(_) => "storage",
            AnalyzerError::ConfigError(_) => "config",
            AnalyzerError::TemplateError(_) => "template",
            AnalyzerError::Journal(_) => "journal",
            AnalyzerError::Ingest(_) => "ingest",
            _ => "provider",
        }
    }
}

impl From<StorageError> for AnalyzerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DataValidation(message) => AnalyzerError::DataValidation(message),
            other => AnalyzerError::Storage(other),
        }
    }
}

impl From<config::ConfigError> for AnalyzerError {
    fn from(err: config::ConfigError) -> Self {
        AnalyzerError::ConfigError(err.to_string())
    }
}
