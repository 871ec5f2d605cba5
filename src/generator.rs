//! Generator Client
//!
//! Wraps a [`GenerationBackend`] into one call per attempt: builds the template
//! variables, picks the preset for the attempt and turns backend failures into
//! `AnalyzerError::Generation`.

pub mod backend;

pub use backend::{
    render_template, GenerationBackend, ProviderBackend, TemplateOutcome, TemplateVariables,
};

use crate::analysis::AnalysisSchema;
use crate::error::AnalyzerError;
use crate::retry::AttemptContext;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Raw answer plus the preset and model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub response: String,
    pub preset: String,
    pub model: String,
    pub identifier: String,
}

pub struct GeneratorClient {
    backend: Arc<dyn GenerationBackend>,
    template: String,
    schema: AnalysisSchema,
    preset: String,
    fallback_preset: Option<String>,
}

impl GeneratorClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        template: impl Into<String>,
        schema: AnalysisSchema,
    ) -> Self {
        let preset = backend.default_preset().to_string();
        Self {
            backend,
            template: template.into(),
            schema,
            preset,
            fallback_preset: None,
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn with_fallback_preset(mut self, preset: Option<String>) -> Self {
        self.fallback_preset = preset;
        self
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    /// Preset for an attempt: the fallback once more than one failure has been
    /// seen for the current unit, otherwise the primary.
    pub fn preset_for(&self, context: &AttemptContext) -> &str {
        match &self.fallback_preset {
            Some(fallback) if context.consecutive_failures > 1 => fallback,
            _ => &self.preset,
        }
    }

    pub async fn invoke(
        &self,
        unit_id: i64,
        text: &str,
        context: &AttemptContext,
    ) -> Result<Generated, AnalyzerError> {
        let identifier = correlation_token();
        let preset = self.preset_for(context);
        if preset != self.preset {
            warn!(
                unit_id,
                failures = context.consecutive_failures,
                preset,
                "Escalating to fallback preset"
            );
        }

        let mut variables = TemplateVariables::new();
        variables.insert(self.schema.text_variable().to_string(), text.to_string());
        variables.insert("identifier".to_string(), identifier.clone());

        debug!(unit_id, preset, identifier = %identifier, template = %self.template, "Invoking generator");
        let outcome = self
            .backend
            .run_template(&self.template, &variables, Some(preset))
            .await?;

        if !outcome.success {
            return Err(AnalyzerError::Generation(outcome.message));
        }

        Ok(Generated {
            response: outcome.response,
            model: outcome.model.unwrap_or_else(|| preset.to_string()),
            preset: preset.to_string(),
            identifier,
        })
    }
}

/// First eight hex characters of a random UUID.
fn correlation_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
