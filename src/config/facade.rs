//! Config loading entry point.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::GleanerConfig;
use crate::error::AnalyzerError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, user file, project file (`explicit` or
    /// `<working_dir>/gleaner.toml`) and environment, in that order.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> Result<GleanerConfig, AnalyzerError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, explicit, working_dir)?;
        let config = builder.add_source(merge_policy::environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load only from one file plus defaults. No user file, no environment.
    pub fn load_file(path: &Path) -> Result<GleanerConfig, AnalyzerError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = workspace_file::add_to_builder(builder, Some(path), Path::new("."))?;
        Ok(builder.build()?.try_deserialize()?)
    }
}
