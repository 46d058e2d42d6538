use std::sync::Arc;

use crate::{
    config::PromptTemplate,
    error::GenerationError,
    generation::{generate_with, GenerationOptions, SamplingParams},
    metrics::{MetricsCollector, MetricsSnapshot},
    model::{GenerationModel, TextTokenizer},
    types::Completion,
};

/// Model, tokenizer and generation parameters bound to one prompt template.
///
/// Holds no per-request state; every call to [`complete`](Self::complete)
/// is independent. Concurrent calls serialize on the model's device lock.
pub struct GenerationEngine {
    pub(super) model: Arc<GenerationModel>,
    pub(super) tokenizer: Arc<TextTokenizer>,
    pub(super) context_window: usize,
    pub(super) max_new_tokens: usize,
    pub(super) sampling: SamplingParams,
    pub(super) system_prompt: String,
    pub(super) query_template: PromptTemplate,
    pub(super) metrics: MetricsCollector,
}

impl GenerationEngine {
    /// Wrap `query` in the template, prefixed by the system prompt if any
    pub fn format_query(&self, query: &str) -> String {
        let wrapped = self.query_template.format(query);
        if self.system_prompt.is_empty() {
            wrapped
        } else {
            format!("{} {}", self.system_prompt, wrapped)
        }
    }

    /// Answer `query` with the engine's configured generation parameters
    pub fn complete(&self, query: &str) -> Result<Completion, GenerationError> {
        let prompt = self.format_query(query);
        let options = GenerationOptions {
            max_new_tokens: self.max_new_tokens,
            sampling: self.sampling.clone(),
            input_limit: Some(self.input_limit()),
        };

        let result = generate_with(&self.model, &self.tokenizer, &prompt, &options);
        match &result {
            Ok(completion) => self
                .metrics
                .record_success(completion.elapsed, completion.generated_tokens),
            Err(_) => self.metrics.record_failure(),
        }
        result
    }

    /// Prompt tokens accepted per request
    pub fn input_limit(&self) -> usize {
        self.context_window
            .min(self.tokenizer.max_length())
            .min(self.model.max_positions())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn model(&self) -> &Arc<GenerationModel> {
        &self.model
    }

    pub fn tokenizer(&self) -> &Arc<TextTokenizer> {
        &self.tokenizer
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn max_new_tokens(&self) -> usize {
        self.max_new_tokens
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn query_template(&self) -> &PromptTemplate {
        &self.query_template
    }
}

impl std::fmt::Debug for GenerationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEngine")
            .field("model", &self.model)
            .field("context_window", &self.context_window)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("sampling", &self.sampling)
            .finish()
    }
}
