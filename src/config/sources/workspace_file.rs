//! Project config file source: an explicit `--config` path, else ./gleaner.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "gleaner.toml";

/// Add the project config file to the builder. An explicit path must exist; the
/// default file is optional.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(builder.add_source(File::from(path).required(true)));
    }

    let default_path = working_dir.join(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return Ok(builder.add_source(File::from(default_path.as_path()).required(false)));
    }
    Ok(builder)
}
