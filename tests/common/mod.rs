#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use completion_bootstrap::device::{ComputeBackend, DeviceProbe};
use completion_bootstrap::model::{load_tokenizer, CausalLm, GenerationModel, ModelFactory, TextTokenizer};
use completion_bootstrap::StartupError;
use parking_lot::Mutex;

/// Vocabulary without `<unk>`: unknown words fail to encode
pub const VOCAB: [&str; 12] = [
    "</s>", "hello", "OK", "world", "a", "b", "c", "d", "e", "f", "g", "h",
];
pub const EOS: u32 = 0;
pub const OK: u32 = 2;

/// Answers every prompt with a fixed token script followed by EOS
pub struct EchoLm {
    script: Vec<u32>,
    step: usize,
    prefills: Arc<Mutex<Vec<usize>>>,
}

impl EchoLm {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            step: 0,
            prefills: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Prompt lengths seen at position 0, in the order requests ran
    pub fn prefills(&self) -> Arc<Mutex<Vec<usize>>> {
        self.prefills.clone()
    }
}

impl CausalLm for EchoLm {
    fn reset(&mut self) -> candle_core::Result<()> {
        self.step = 0;
        Ok(())
    }

    fn forward(&mut self, input_ids: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        if position == 0 {
            self.prefills.lock().push(input_ids.dim(1)?);
        }
        let token = self.script.get(self.step).copied().unwrap_or(EOS) as usize;
        self.step += 1;

        let mut logits = vec![0f32; VOCAB.len()];
        logits[token] = 1.0;
        Tensor::new(logits.as_slice(), &Device::Cpu)
    }

    fn max_positions(&self) -> usize {
        64
    }

    fn vocab_size(&self) -> usize {
        VOCAB.len()
    }
}

pub fn echo_model() -> GenerationModel {
    GenerationModel::new(Box::new(EchoLm::new(vec![OK])), ComputeBackend::Cpu, Device::Cpu, DType::F32)
}

/// Loads an [`EchoLm`] from any existing directory
pub struct EchoFactory;

impl ModelFactory for EchoFactory {
    fn load(&self, dir: &Path, _device: &Device, _dtype: DType) -> completion_bootstrap::error::Result<Box<dyn CausalLm>> {
        if !dir.is_dir() {
            return Err(StartupError::Model {
                path: dir.to_path_buf(),
                message: "model directory not found".to_string(),
            });
        }
        Ok(Box::new(EchoLm::new(vec![OK])))
    }
}

pub struct CpuOnly;

impl DeviceProbe for CpuOnly {
    fn cuda_available(&self) -> bool {
        false
    }

    fn metal_available(&self) -> bool {
        false
    }
}

pub fn write_tokenizer(dir: &Path) {
    write_tokenizer_with(dir, &VOCAB);
}

/// WordLevel `tokenizer.json` over an arbitrary vocabulary
pub fn write_tokenizer_with(dir: &Path, vocab: &[&str]) {
    let vocab = vocab
        .iter()
        .enumerate()
        .map(|(i, t)| format!("\"{}\": {}", t, i))
        .collect::<Vec<_>>()
        .join(", ");
    let json = format!(
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
    );

    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("tokenizer.json"), json).unwrap();
}

pub fn echo_tokenizer(dir: &Path, max_length: usize) -> TextTokenizer {
    write_tokenizer(dir);
    load_tokenizer(dir, max_length).unwrap()
}

pub const LLM_CONFIG: &str = r#"{
    "context_window": 64,
    "max_new_tokens": 5,
    "generate_kwargs": {"do_sample": false},
    "system_prompt": "",
    "query_template": "{query_str}"
}"#;

/// Every artifact of a model root; `llm_model/` is left empty
pub fn write_model_root(root: &Path) {
    fs::write(root.join("index.pkl"), b"\x80\x04index").unwrap();
    fs::write(root.join("embedding_model_cpu.pkl"), b"\x80\x04embedding").unwrap();
    fs::create_dir_all(root.join("llm_model")).unwrap();
    write_tokenizer(&root.join("llm_tokenizer"));
    fs::write(root.join("llm_config.json"), LLM_CONFIG).unwrap();
}

const TINY_LLAMA: &str = r#"{
    "architectures": ["LlamaForCausalLM"],
    "model_type": "llama",
    "hidden_size": 16,
    "intermediate_size": 32,
    "vocab_size": 12,
    "num_hidden_layers": 1,
    "num_attention_heads": 2,
    "num_key_value_heads": 2,
    "rms_norm_eps": 1e-5,
    "max_position_embeddings": 32,
    "eos_token_id": 0
}"#;

/// A one-layer llama checkpoint with zero weights
pub fn write_tiny_llama(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("config.json"), TINY_LLAMA).unwrap();

    let (vocab, hidden, intermediate) = (12, 16, 32);
    let shapes: Vec<(String, Vec<usize>)> = vec![
        ("model.embed_tokens.weight".into(), vec![vocab, hidden]),
        ("model.norm.weight".into(), vec![hidden]),
        ("lm_head.weight".into(), vec![vocab, hidden]),
        ("model.layers.0.self_attn.q_proj.weight".into(), vec![hidden, hidden]),
        ("model.layers.0.self_attn.k_proj.weight".into(), vec![hidden, hidden]),
        ("model.layers.0.self_attn.v_proj.weight".into(), vec![hidden, hidden]),
        ("model.layers.0.self_attn.o_proj.weight".into(), vec![hidden, hidden]),
        ("model.layers.0.mlp.gate_proj.weight".into(), vec![intermediate, hidden]),
        ("model.layers.0.mlp.up_proj.weight".into(), vec![intermediate, hidden]),
        ("model.layers.0.mlp.down_proj.weight".into(), vec![hidden, intermediate]),
        ("model.layers.0.input_layernorm.weight".into(), vec![hidden]),
        ("model.layers.0.post_attention_layernorm.weight".into(), vec![hidden]),
    ];

    let tensors: HashMap<String, Tensor> = shapes
        .into_iter()
        .map(|(name, shape)| (name, Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap()))
        .collect();
    candle_core::safetensors::save(&tensors, dir.join("model.safetensors")).unwrap();
}
