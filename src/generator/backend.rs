//! Text-generation backends.
//!
//! A backend runs a named template with a set of variables against a preset and
//! reports success, the response text and a user-facing message.

use crate::error::AnalyzerError;
use crate::provider::{ChatMessage, ModelProviderClient, ProviderConfig, ProviderFactory};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, warn};

pub type TemplateVariables = BTreeMap<String, String>;

/// Result of one template run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOutcome {
    pub success: bool,
    pub response: String,
    pub message: String,
    /// Model that produced the response, when the backend knows it
    pub model: Option<String>,
}

impl TemplateOutcome {
    pub fn success(response: impl Into<String>, model: Option<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            message: String::new(),
            model,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            message: message.into(),
            model: None,
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run `template` with `variables`. `preset` overrides the backend default.
    /// A failed generation is reported through `TemplateOutcome::success`; `Err`
    /// is reserved for problems no retry can fix (missing template or preset).
    async fn run_template(
        &self,
        template: &str,
        variables: &TemplateVariables,
        preset: Option<&str>,
    ) -> Result<TemplateOutcome, AnalyzerError>;

    /// Preset used when no override is given.
    fn default_preset(&self) -> &str;
}

/// Substitute `{{ name }}` placeholders. Unknown placeholders are an error so a
/// template typo never reaches the model.
pub fn render_template(template: &str, variables: &TemplateVariables) -> Result<String, AnalyzerError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open.find("}}").ok_or_else(|| {
            AnalyzerError::TemplateError("Unterminated '{{' placeholder".to_string())
        })?;
        let name = after_open[..close].trim();
        let value = variables.get(name).ok_or_else(|| {
            AnalyzerError::TemplateError(format!("Template variable '{}' is not defined", name))
        })?;
        out.push_str(value);
        rest = &after_open[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Backend that renders template files and sends them to the preset's provider.
pub struct ProviderBackend {
    templates_dir: PathBuf,
    presets: HashMap<String, ProviderConfig>,
    default_preset: String,
    clients: HashMap<String, Box<dyn ModelProviderClient>>,
}

impl ProviderBackend {
    /// Build one client per preset up front so configuration problems surface
    /// before the first unit is processed.
    pub fn new(
        templates_dir: PathBuf,
        presets: HashMap<String, ProviderConfig>,
        default_preset: String,
    ) -> Result<Self, AnalyzerError> {
        if !presets.contains_key(&default_preset) {
            return Err(AnalyzerError::ConfigError(format!(
                "Default preset '{}' is not defined",
                default_preset
            )));
        }
        let mut clients = HashMap::new();
        for (name, config) in &presets {
            clients.insert(name.clone(), ProviderFactory::create_client(config)?);
        }
        Ok(Self {
            templates_dir,
            presets,
            default_preset,
            clients,
        })
    }

    fn load_template(&self, template: &str) -> Result<String, AnalyzerError> {
        let path = self.templates_dir.join(template);
        std::fs::read_to_string(&path).map_err(|e| {
            AnalyzerError::TemplateError(format!(
                "Failed to read template {}: {}",
                path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl GenerationBackend for ProviderBackend {
    async fn run_template(
        &self,
        template: &str,
        variables: &TemplateVariables,
        preset: Option<&str>,
    ) -> Result<TemplateOutcome, AnalyzerError> {
        let preset_name = preset.unwrap_or(&self.default_preset);
        let (config, client) = match (self.presets.get(preset_name), self.clients.get(preset_name)) {
            (Some(config), Some(client)) => (config, client),
            _ => {
                return Err(AnalyzerError::ConfigError(format!(
                    "Preset '{}' is not defined",
                    preset_name
                )))
            }
        };

        let prompt = render_template(&self.load_template(template)?, variables)?;
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &config.system_message {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(prompt));

        debug!(
            preset = preset_name,
            provider = client.provider_name(),
            model = client.model_name(),
            template,
            "Running template"
        );

        match client.complete(messages, config.default_options.clone()).await {
            Ok(completion) => Ok(TemplateOutcome::success(
                completion.content,
                Some(client.model_name().to_string()),
            )),
            Err(err) => {
                warn!(preset = preset_name, error = %err, "Generation request failed");
                Ok(TemplateOutcome::failure(err.to_string()))
            }
        }
    }

    fn default_preset(&self) -> &str {
        &self.default_preset
    }
}
