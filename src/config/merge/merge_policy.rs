//! Merge rules: built-in defaults, then files, then environment.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Environment variables are read as `GLEANER__<SECTION>__<KEY>`.
pub const ENV_PREFIX: &str = "GLEANER";
pub const ENV_SEPARATOR: &str = "__";

/// Create a Config builder with every scalar default applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("generation.templates_dir", "templates")?
        .set_default("generation.preset", "default")?
        .set_default("generation.schema", "voicemail")?
        .set_default("batch.batch_size", 1000)?
        .set_default("batch.limit", 0)?
        .set_default("batch.pause_secs", 0.0)?
        .set_default("retry.generation_attempts", 5)?
        .set_default("retry.persistence_attempts", 3)?
        .set_default("retry.failure_mark_attempts", 3)?
        .set_default("retry.selection_attempts", 3)?
        .set_default("retry.delay_secs", 5)
}

/// Environment source applied last, so it overrides every file.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("batch.excluded_group_keys")
}
