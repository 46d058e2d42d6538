//! Request-time text generation
//!
//! `generate` is the entry point used per request: it tokenizes the prompt,
//! runs a bounded decode loop on the model's device and returns only the
//! newly generated text. Failures never escape as panics or raw backend
//! errors; they are logged and reported as an opaque [`GenerationError`].

mod sampling;

use std::time::Instant;

use anyhow::{bail, Context};
use candle_core::Tensor;
use tracing::{debug, error, info};

pub use sampling::SamplingParams;

use crate::error::GenerationError;
use crate::model::{GenerationModel, TextTokenizer};
use crate::types::Completion;

/// Token budget used when the caller does not pass one
pub const DEFAULT_MAX_TOKENS: usize = 50;

/// Per-call generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
    pub sampling: SamplingParams,
    /// Extra cap on prompt tokens, applied after the tokenizer's own
    /// truncation. `None` keeps the tokenizer limit.
    pub input_limit: Option<usize>,
}

impl GenerationOptions {
    /// Greedy decoding of at most `max_new_tokens` tokens
    pub fn greedy(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            sampling: SamplingParams::greedy(),
            input_limit: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::greedy(DEFAULT_MAX_TOKENS)
    }
}

/// Generate a continuation of `prompt` and return the new text, trimmed.
pub fn generate(
    model: &GenerationModel,
    tokenizer: &TextTokenizer,
    prompt: &str,
    max_tokens: usize,
) -> Result<String, GenerationError> {
    generate_with(model, tokenizer, prompt, &GenerationOptions::greedy(max_tokens)).map(|c| c.text)
}

/// Full form of [`generate`], reporting timing and token counts
pub fn generate_with(
    model: &GenerationModel,
    tokenizer: &TextTokenizer,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<Completion, GenerationError> {
    run(model, tokenizer, prompt, options).map_err(|e| {
        let message = describe(&e);
        error!(error = %message, "Error in generate");
        GenerationError::new(message)
    })
}

/// The error chain on one line.
///
/// Candle appends captured backtraces to an error's display text, so only the
/// first line of each cause is kept.
fn describe(error: &anyhow::Error) -> String {
    error
        .chain()
        .map(|cause| cause.to_string().lines().next().unwrap_or_default().trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(": ")
}

fn run(
    model: &GenerationModel,
    tokenizer: &TextTokenizer,
    prompt: &str,
    options: &GenerationOptions,
) -> anyhow::Result<Completion> {
    let mut prompt_ids = tokenizer.encode(prompt).context("failed to tokenize prompt")?;
    let limit = options
        .input_limit
        .unwrap_or(usize::MAX)
        .min(model.max_positions());
    prompt_ids.truncate(limit);
    if prompt_ids.is_empty() {
        bail!("prompt produced no tokens");
    }

    let mut eos_ids = model.eos_token_ids().to_vec();
    eos_ids.push(tokenizer.eos_token_id());

    let mut processor = options.sampling.logits_processor();
    let prompt_tokens = prompt_ids.len();
    let mut tokens = prompt_ids;
    let mut generated: Vec<u32> = Vec::with_capacity(options.max_new_tokens);

    let mut runtime = model.lock();
    runtime.reset()?;

    let start = Instant::now();
    let mut position = 0;
    for step in 0..options.max_new_tokens {
        let context_start = if step == 0 { 0 } else { tokens.len() - 1 };
        let input_len = tokens.len() - context_start;
        if position + input_len > model.max_positions() {
            debug!(position, "Position limit reached");
            break;
        }

        let input = Tensor::new(&tokens[context_start..], model.device())?.unsqueeze(0)?;
        let logits = runtime.forward(&input, position)?;
        position += input_len;

        let logits = options.sampling.apply_repeat_penalty(&logits, &tokens)?;
        let next = processor.sample(&logits)?;
        if eos_ids.contains(&next) {
            break;
        }
        tokens.push(next);
        generated.push(next);
    }
    let elapsed = start.elapsed();
    drop(runtime);

    info!(
        generated_tokens = generated.len(),
        "Response generated in {:.2}s",
        elapsed.as_secs_f64()
    );

    let text = tokenizer.decode(&generated).context("failed to decode output")?;

    Ok(Completion {
        text: text.trim().to_string(),
        elapsed,
        prompt_tokens,
        generated_tokens: generated.len(),
    })
}
