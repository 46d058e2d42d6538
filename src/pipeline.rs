//! One-shot startup of the inference pipeline
//!
//! Initialization runs in a fixed order: resolve the device, load the index,
//! load the generation model and its tokenizer, load the embedding model,
//! read the generation config, build the engine and finally publish the
//! process-wide settings. Any failure aborts startup with the error; nothing
//! is published until every artifact has loaded.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span};

use crate::artifacts::{load_embedding_model, load_index, EmbeddingModel, RetrievalIndex};
use crate::config::{load_generation_config, GenerationConfig, PipelineConfig};
use crate::device::{resolve_preferred, ComputeBackend, DeviceProbe, SystemProbe};
use crate::engine::{EngineBuilder, GenerationEngine};
use crate::error::{GenerationError, Result, StartupError};
use crate::generation::generate;
use crate::model::{load_generation_model_on, load_tokenizer, CandleModelFactory, GenerationModel, ModelFactory, TextTokenizer};
use crate::settings::{Settings, SettingsRegistry};
use crate::types::Completion;

/// Everything loaded at startup, owned by the caller.
///
/// Built once and never mutated afterwards; share it behind an `Arc`.
#[derive(Debug)]
pub struct ArtifactBundle {
    backend: ComputeBackend,
    index: Arc<RetrievalIndex>,
    embedding_model: Arc<EmbeddingModel>,
    model: Arc<GenerationModel>,
    tokenizer: Arc<TextTokenizer>,
    config: GenerationConfig,
    engine: Arc<GenerationEngine>,
    settings: Arc<Settings>,
}

impl ArtifactBundle {
    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }

    pub fn index(&self) -> &Arc<RetrievalIndex> {
        &self.index
    }

    pub fn embedding_model(&self) -> &Arc<EmbeddingModel> {
        &self.embedding_model
    }

    pub fn model(&self) -> &Arc<GenerationModel> {
        &self.model
    }

    pub fn tokenizer(&self) -> &Arc<TextTokenizer> {
        &self.tokenizer
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Raw greedy generation against the bundled model and tokenizer
    pub fn generate(&self, prompt: &str, max_tokens: usize) -> std::result::Result<String, GenerationError> {
        generate(&self.model, &self.tokenizer, prompt, max_tokens)
    }

    /// Templated completion through the bundled engine
    pub fn complete(&self, query: &str) -> std::result::Result<Completion, GenerationError> {
        self.engine.complete(query)
    }
}

/// Entry point for pipeline startup
pub struct Pipeline;

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }
}

/// Configures and runs pipeline initialization
pub struct PipelineBuilder {
    config: PipelineConfig,
    probe: Box<dyn DeviceProbe>,
    factory: Box<dyn ModelFactory>,
    registry: SettingsRegistry,
}

impl PipelineBuilder {
    /// Default config, system device probe, candle model loader and the
    /// process-wide settings registry
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            probe: Box::new(SystemProbe::new()),
            factory: Box::new(CandleModelFactory),
            registry: SettingsRegistry::global().clone(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_probe(mut self, probe: impl DeviceProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_model_factory(mut self, factory: impl ModelFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_registry(mut self, registry: SettingsRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Load every artifact and publish the settings
    pub fn initialize(self) -> Result<ArtifactBundle> {
        let span = info_span!("initialize", model_root = %self.config.model_root.display());
        let _guard = span.enter();
        let start = Instant::now();

        self.config.validate()?;

        let backend = resolve_preferred(self.config.device, self.probe.as_ref());

        let index = load_index(self.config.index_path())?;

        let device = self.probe.open(backend)?;
        let model = load_generation_model_on(
            self.config.generation_model_path(),
            backend,
            device,
            self.factory.as_ref(),
        )?;
        let max_length = self.config.max_input_length.min(model.max_positions());
        let tokenizer_path = self.config.tokenizer_path();
        let tokenizer = load_tokenizer(&tokenizer_path, max_length)?;
        ensure_compatible(&model, &tokenizer, &tokenizer_path)?;

        let embedding_model = load_embedding_model(self.config.embedding_model_path())?;

        let config = load_generation_config(self.config.generation_config_path())?;

        let model = Arc::new(model);
        let tokenizer = Arc::new(tokenizer);
        let engine = EngineBuilder::new(config.clone())
            .with_model(model.clone())
            .with_tokenizer(tokenizer.clone())
            .build()?;

        let embedding_model = Arc::new(embedding_model);
        let engine = Arc::new(engine);
        let settings = self.registry.register_with_chunk_size(
            embedding_model.clone(),
            engine.clone(),
            self.config.chunk_size,
        )?;

        info!(
            backend = %backend,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline initialized"
        );

        Ok(ArtifactBundle {
            backend,
            index: Arc::new(index),
            embedding_model,
            model,
            tokenizer,
            config,
            engine,
            settings,
        })
    }
}

/// Every id the tokenizer can emit must index the model's embedding table
fn ensure_compatible(model: &GenerationModel, tokenizer: &TextTokenizer, path: &Path) -> Result<()> {
    let vocab_size = model.vocab_size();
    let mismatch = |message: String| StartupError::Tokenizer {
        path: path.to_path_buf(),
        message,
    };

    if tokenizer.vocab_size() > vocab_size {
        return Err(mismatch(format!(
            "tokenizer has {} tokens but the model only embeds {}",
            tokenizer.vocab_size(),
            vocab_size
        )));
    }
    for (role, id) in [("eos", tokenizer.eos_token_id()), ("pad", tokenizer.pad_token_id())] {
        if id as usize >= vocab_size {
            return Err(mismatch(format!(
                "{} token id {} is outside the model vocabulary of {}",
                role, id, vocab_size
            )));
        }
    }
    Ok(())
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize from the environment into the process-wide registry.
///
/// Call once at process start; a second call fails because the settings
/// are already registered.
pub fn initialize_all() -> Result<ArtifactBundle> {
    Pipeline::builder()
        .with_config(PipelineConfig::from_env()?)
        .initialize()
}
