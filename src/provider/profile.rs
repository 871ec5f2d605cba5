//! Preset profiles: which provider and model a named preset talks to.

use crate::error::AnalyzerError;
use crate::provider::CompletionOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Ollama,
    /// Any server speaking the OpenAI chat completions API
    Local,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Ollama => "ollama",
            ProviderType::Local => "local",
        };
        f.write_str(name)
    }
}

/// One `[presets.<name>]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub model: String,
    /// Literal key; prefer `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// System prompt sent ahead of the rendered template
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub default_options: CompletionOptions,
}

impl ProviderConfig {
    /// Resolve the API key, reading `api_key_env` when no literal key is set.
    pub fn resolve_api_key(&self) -> Result<Option<String>, AnalyzerError> {
        if let Some(key) = &self.api_key {
            return Ok(Some(key.clone()));
        }
        match &self.api_key_env {
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                AnalyzerError::ProviderNotConfigured(format!(
                    "Environment variable {} is not set",
                    var
                ))
            }),
            None => Ok(None),
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(
            self.provider_type,
            ProviderType::OpenAI | ProviderType::Anthropic
        )
    }

    /// Configuration problems for this preset, if any.
    pub fn validate(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.model.trim().is_empty() {
            errors.push(format!("Preset '{}' has an empty model name", name));
        }
        if self.requires_api_key() && self.api_key.is_none() && self.api_key_env.is_none() {
            errors.push(format!(
                "Preset '{}' ({}) requires api_key or api_key_env",
                name, self.provider_type
            ));
        }
        if self.provider_type == ProviderType::Local && self.endpoint.is_none() {
            errors.push(format!("Preset '{}' (local) requires an endpoint", name));
        }
        if let Some(temperature) = self.default_options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(format!(
                    "Preset '{}' temperature must be between 0.0 and 2.0",
                    name
                ));
            }
        }
        errors
    }
}
