use std::sync::Arc;

use tracing::info;

use crate::{
    config::GenerationConfig,
    error::{Result, StartupError},
    generation::SamplingParams,
    metrics::MetricsCollector,
    model::{GenerationModel, TextTokenizer},
};

use super::engine::GenerationEngine;

/// Builder for constructing a GenerationEngine instance
pub struct EngineBuilder {
    config: GenerationConfig,
    model: Option<Arc<GenerationModel>>,
    tokenizer: Option<Arc<TextTokenizer>>,
}

impl EngineBuilder {
    /// Create a new builder around a loaded generation config
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            model: None,
            tokenizer: None,
        }
    }

    pub fn with_model(mut self, model: Arc<GenerationModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<TextTokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Build the engine instance.
    ///
    /// Pure construction: nothing is loaded or moved between devices here.
    pub fn build(self) -> Result<GenerationEngine> {
        self.config.validate()?;

        let model = self
            .model
            .ok_or_else(|| StartupError::config_value("model", "Engine requires a generation model"))?;
        let tokenizer = self
            .tokenizer
            .ok_or_else(|| StartupError::config_value("tokenizer", "Engine requires a tokenizer"))?;

        let query_template = self.config.query_template()?;
        let sampling = SamplingParams::from_kwargs(&self.config.generate_kwargs)?;

        info!(
            context_window = self.config.context_window,
            max_new_tokens = self.config.max_new_tokens,
            greedy = sampling.is_greedy(),
            "HuggingFace LLM initialized"
        );

        Ok(GenerationEngine {
            model,
            tokenizer,
            context_window: self.config.context_window,
            max_new_tokens: self.config.max_new_tokens,
            sampling,
            system_prompt: self.config.system_prompt,
            query_template,
            metrics: MetricsCollector::new(),
        })
    }
}
