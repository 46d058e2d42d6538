// Location: src/model/runtime.rs

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config as LlamaRuntimeConfig, Llama, LlamaConfig, LlamaEosToks};
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM as Qwen2Model};
use parking_lot::{Mutex, MutexGuard};

use crate::device::ComputeBackend;

/// A causal language model that can be driven one decode step at a time.
///
/// Implementations keep their own KV cache; `reset` must be called before
/// each new request so requests stay independent.
pub trait CausalLm: Send {
    /// Drop decoding state left over from a previous request
    fn reset(&mut self) -> candle_core::Result<()>;

    /// Run `input_ids` (shape `(1, seq)`) starting at `position` and return
    /// the logits of the last position as a `(vocab,)` tensor.
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> candle_core::Result<Tensor>;

    /// Longest sequence the model can attend over
    fn max_positions(&self) -> usize;

    /// Rows in the embedding table; valid token ids are below this
    fn vocab_size(&self) -> usize;

    /// End-of-sequence ids declared by the model itself
    fn eos_token_ids(&self) -> Vec<u32> {
        Vec::new()
    }
}

pub struct LlamaRuntime {
    model: Llama,
    config: LlamaRuntimeConfig,
    cache: Cache,
    dtype: DType,
    device: Device,
}

impl LlamaRuntime {
    pub fn new(
        config: LlamaConfig,
        vb: VarBuilder,
        dtype: DType,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let config = config.into_config(false);
        let model = Llama::load(vb, &config)?;
        let cache = Cache::new(true, dtype, &config, device)?;

        Ok(Self {
            model,
            config,
            cache,
            dtype,
            device: device.clone(),
        })
    }
}

impl CausalLm for LlamaRuntime {
    fn reset(&mut self) -> candle_core::Result<()> {
        self.cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        Ok(())
    }

    fn forward(&mut self, input_ids: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        let logits = self.model.forward(input_ids, position, &mut self.cache)?;
        logits.squeeze(0)?.to_dtype(DType::F32)
    }

    fn max_positions(&self) -> usize {
        self.config.max_position_embeddings
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn eos_token_ids(&self) -> Vec<u32> {
        match &self.config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => Vec::new(),
        }
    }
}

pub struct Qwen2Runtime {
    model: Qwen2Model,
    max_positions: usize,
    vocab_size: usize,
}

impl Qwen2Runtime {
    pub fn new(config: &Qwen2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            model: Qwen2Model::new(config, vb)?,
            max_positions: config.max_position_embeddings,
            vocab_size: config.vocab_size,
        })
    }
}

impl CausalLm for Qwen2Runtime {
    fn reset(&mut self) -> candle_core::Result<()> {
        self.model.clear_kv_cache();
        Ok(())
    }

    fn forward(&mut self, input_ids: &Tensor, position: usize) -> candle_core::Result<Tensor> {
        // (1, 1, vocab) -> (vocab,)
        let logits = self.model.forward(input_ids, position)?;
        logits.squeeze(0)?.squeeze(0)?.to_dtype(DType::F32)
    }

    fn max_positions(&self) -> usize {
        self.max_positions
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

/// A loaded generation model pinned to one backend device.
///
/// The runtime sits behind a mutex that acts as the single-flight gate for
/// the device: concurrent requests against the same model run one at a time.
pub struct GenerationModel {
    runtime: Mutex<Box<dyn CausalLm>>,
    backend: ComputeBackend,
    device: Device,
    dtype: DType,
    max_positions: usize,
    vocab_size: usize,
    eos_token_ids: Vec<u32>,
}

impl GenerationModel {
    pub fn new(runtime: Box<dyn CausalLm>, backend: ComputeBackend, device: Device, dtype: DType) -> Self {
        let max_positions = runtime.max_positions();
        let vocab_size = runtime.vocab_size();
        let eos_token_ids = runtime.eos_token_ids();

        Self {
            runtime: Mutex::new(runtime),
            backend,
            device,
            dtype,
            max_positions,
            vocab_size,
            eos_token_ids,
        }
    }

    /// Exclusive access to the runtime for one request
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn CausalLm>> {
        self.runtime.lock()
    }

    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

impl std::fmt::Debug for GenerationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationModel")
            .field("backend", &self.backend)
            .field("dtype", &self.dtype)
            .field("max_positions", &self.max_positions)
            .field("vocab_size", &self.vocab_size)
            .finish()
    }
}
