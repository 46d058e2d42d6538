//! Sampling parameters derived from `generate_kwargs`

use candle_core::Tensor;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, StartupError};

pub(crate) const DEFAULT_SEED: u64 = 299_792_458;

/// How the next token is chosen at each decode step.
///
/// Decoding is greedy unless `do_sample` is set and the temperature is
/// positive, matching the usual `generate()` conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub do_sample: bool,
    pub temperature: f64,
    /// `None` disables top-p filtering
    pub top_p: Option<f64>,
    /// `None` disables top-k filtering
    pub top_k: Option<usize>,
    /// 1.0 disables the penalty
    pub repetition_penalty: f32,
    /// How many trailing tokens the penalty looks at
    pub repetition_context_size: usize,
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::greedy()
    }
}

impl SamplingParams {
    pub fn greedy() -> Self {
        Self {
            do_sample: false,
            temperature: 1.0,
            top_p: None,
            top_k: None,
            repetition_penalty: 1.0,
            repetition_context_size: 64,
            seed: DEFAULT_SEED,
        }
    }

    /// Interpret the scalar kwargs of a generation config.
    ///
    /// Unknown keys are ignored with a warning; a known key holding the wrong
    /// kind of scalar is a configuration error.
    pub fn from_kwargs(kwargs: &Map<String, Value>) -> Result<Self> {
        let mut params = Self::greedy();

        for (key, value) in kwargs {
            match key.as_str() {
                "do_sample" => params.do_sample = as_bool(key, value)?,
                "temperature" => params.temperature = as_f64(key, value)?,
                "top_p" => {
                    let p = as_f64(key, value)?;
                    if !(0.0..=1.0).contains(&p) {
                        return Err(kwarg_error(key, "must be between 0 and 1"));
                    }
                    params.top_p = (p < 1.0).then_some(p);
                }
                "top_k" => {
                    let k = as_usize(key, value)?;
                    params.top_k = (k > 0).then_some(k);
                }
                "repetition_penalty" => {
                    let penalty = as_f64(key, value)?;
                    if penalty <= 0.0 {
                        return Err(kwarg_error(key, "must be positive"));
                    }
                    params.repetition_penalty = penalty as f32;
                }
                "repetition_context_size" => params.repetition_context_size = as_usize(key, value)?,
                "seed" => params.seed = as_usize(key, value)? as u64,
                other => warn!(key = other, "Ignoring unsupported generation kwarg"),
            }
        }

        Ok(params)
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature <= 0.0
    }

    pub fn sampling(&self) -> Sampling {
        if self.is_greedy() {
            return Sampling::ArgMax;
        }

        let temperature = self.temperature;
        match (self.top_k, self.top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }

    pub fn logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::from_sampling(self.seed, self.sampling())
    }

    /// Penalize tokens seen in the trailing context window
    pub fn apply_repeat_penalty(&self, logits: &Tensor, context: &[u32]) -> candle_core::Result<Tensor> {
        if self.repetition_penalty == 1.0 {
            return Ok(logits.clone());
        }

        let start_at = context.len().saturating_sub(self.repetition_context_size);
        candle_transformers::utils::apply_repeat_penalty(logits, self.repetition_penalty, &context[start_at..])
    }
}

fn kwarg_error(key: &str, message: &str) -> StartupError {
    StartupError::config_value(format!("generate_kwargs.{}", key), message)
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| kwarg_error(key, "expected a boolean"))
}

fn as_f64(key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| kwarg_error(key, "expected a number"))
}

fn as_usize(key: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| kwarg_error(key, "expected a non-negative integer"))
}
