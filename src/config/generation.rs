use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Result, StartupError};

/// Substitution point for the user query
pub const QUERY_PLACEHOLDER: &str = "{query_str}";

/// Query wrapper bound to the engine unless the config overrides it
pub const DEFAULT_QUERY_TEMPLATE: &str = "<|USER|>{query_str}<|ASSISTANT|>";

/// Generation settings read from `llm_config.json`.
///
/// Every field except `query_template` is required; nothing is defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub context_window: usize,
    pub max_new_tokens: usize,
    pub generate_kwargs: Map<String, Value>,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_template: Option<String>,
}

impl GenerationConfig {
    /// The template to bind, falling back to the fixed default
    pub fn query_template(&self) -> Result<PromptTemplate> {
        PromptTemplate::parse(self.query_template.as_deref().unwrap_or(DEFAULT_QUERY_TEMPLATE))
    }

    pub fn validate(&self) -> Result<()> {
        if self.context_window == 0 {
            return Err(StartupError::config_value(
                "context_window",
                "Context window must be positive",
            ));
        }

        if self.max_new_tokens == 0 {
            return Err(StartupError::config_value(
                "max_new_tokens",
                "Max new tokens must be positive",
            ));
        }

        for (key, value) in &self.generate_kwargs {
            if value.is_array() || value.is_object() {
                return Err(StartupError::config_value(
                    format!("generate_kwargs.{}", key),
                    "Sampling parameters must be scalars",
                ));
            }
        }

        self.query_template()?;
        Ok(())
    }
}

/// Parse and validate the generation config at `path`
pub fn load_generation_config(path: impl AsRef<Path>) -> Result<GenerationConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| StartupError::io(path, e))?;
    let config: GenerationConfig =
        serde_json::from_str(&raw).map_err(|source| StartupError::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;

    info!(
        path = %path.display(),
        context_window = config.context_window,
        max_new_tokens = config.max_new_tokens,
        "LLM config loaded"
    );
    Ok(config)
}

/// A prompt template with exactly one `{query_str}` substitution point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    prefix: String,
    suffix: String,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let occurrences = template.matches(QUERY_PLACEHOLDER).count();
        if occurrences != 1 {
            return Err(StartupError::config_value(
                "query_template",
                format!(
                    "Template must contain exactly one {} (found {})",
                    QUERY_PLACEHOLDER, occurrences
                ),
            ));
        }

        let (prefix, suffix) = template
            .split_once(QUERY_PLACEHOLDER)
            .ok_or_else(|| StartupError::config_value("query_template", "Missing placeholder"))?;

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn format(&self, query: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + query.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(query);
        out.push_str(&self.suffix);
        out
    }
}
