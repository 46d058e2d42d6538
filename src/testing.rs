//! Test doubles shared by the unit tests

use std::fs;
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use parking_lot::Mutex;

use crate::config::GenerationConfig;
use crate::device::ComputeBackend;
use crate::engine::{EngineBuilder, GenerationEngine};
use crate::model::{load_tokenizer, CausalLm, GenerationModel, TextTokenizer};

/// Vocabulary used by the scripted model tests. No `<unk>`, so unknown words
/// fail to encode.
pub(crate) const VOCAB: [&str; 6] = ["</s>", "hello", "OK", "world", "a", "b"];
pub(crate) const EOS: u32 = 0;
pub(crate) const OK: u32 = 2;

/// Emits a fixed token script, one token per forward call, then EOS
pub(crate) struct ScriptedLm {
    script: Vec<u32>,
    vocab_size: usize,
    max_positions: usize,
    step: usize,
    fail: bool,
    /// `(seq_len, position)` of every forward call
    pub(crate) trace: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl ScriptedLm {
    pub(crate) fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            vocab_size: VOCAB.len(),
            max_positions: 64,
            step: 0,
            fail: false,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_max_positions(mut self, max_positions: usize) -> Self {
        self.max_positions = max_positions;
        self
    }

    pub(crate) fn into_model(self) -> GenerationModel {
        GenerationModel::new(Box::new(self), ComputeBackend::Cpu, Device::Cpu, DType::F32)
    }
}

impl CausalLm for ScriptedLm {
    fn reset(&mut self) -> candle_core::Result<()> {
        self.step = 0;
        Ok(())
    }

    fn forward(&mut self, input_ids: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        if self.fail {
            return Err(candle_core::Error::Msg(
                "scripted forward failure\n   0: backend frame\n   1: backend frame".to_string(),
            ));
        }
        self.trace.lock().push((input_ids.dim(1)?, position));

        let token = self.script.get(self.step).copied().unwrap_or(EOS) as usize;
        self.step += 1;

        let mut logits = vec![0f32; self.vocab_size];
        logits[token] = 1.0;
        Tensor::new(logits.as_slice(), &Device::Cpu)
    }

    fn max_positions(&self) -> usize {
        self.max_positions
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn eos_token_ids(&self) -> Vec<u32> {
        vec![EOS]
    }
}

/// WordLevel `tokenizer.json` over `vocab` with whitespace splitting
pub(crate) fn tokenizer_json(vocab: &[&str]) -> String {
    let vocab = vocab
        .iter()
        .enumerate()
        .map(|(i, t)| format!("\"{}\": {}", t, i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {{"type": "Whitespace"}},
            "post_processor": null,
            "decoder": null,
            "model": {{"type": "WordLevel", "vocab": {{{}}}, "unk_token": "<unk>"}}
        }}"#,
        vocab
    )
}

pub(crate) fn write_tokenizer(dir: &Path, vocab: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("tokenizer.json"), tokenizer_json(vocab)).unwrap();
}

pub(crate) fn scripted_tokenizer(dir: &Path, max_length: usize) -> TextTokenizer {
    write_tokenizer(dir, &VOCAB);
    load_tokenizer(dir, max_length).unwrap()
}

/// Engine over a scripted model with a bare `{query_str}` template
pub(crate) fn scripted_engine(dir: &Path, lm: ScriptedLm) -> GenerationEngine {
    let config: GenerationConfig = serde_json::from_value(serde_json::json!({
        "context_window": 64,
        "max_new_tokens": 4,
        "generate_kwargs": {},
        "system_prompt": "",
        "query_template": "{query_str}"
    }))
    .unwrap();

    EngineBuilder::new(config)
        .with_model(Arc::new(lm.into_model()))
        .with_tokenizer(Arc::new(scripted_tokenizer(dir, 128)))
        .build()
        .unwrap()
}
