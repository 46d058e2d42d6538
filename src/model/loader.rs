use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::LlamaConfig;
use candle_transformers::models::qwen2::Config as Qwen2Config;
use tracing::info;

use super::runtime::{CausalLm, GenerationModel, LlamaRuntime, Qwen2Runtime};
use crate::device::{precision_for, ComputeBackend};
use crate::error::{Result, StartupError};

/// Builds a runtime from a model directory.
///
/// The initializer only knows this trait, so alternative architectures (or
/// test doubles) can be plugged in without touching the pipeline.
pub trait ModelFactory: Send + Sync {
    fn load(&self, dir: &Path, device: &Device, dtype: DType) -> Result<Box<dyn CausalLm>>;
}

/// Loads safetensors checkpoints for the architectures candle ships
#[derive(Debug, Default, Clone, Copy)]
pub struct CandleModelFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Architecture {
    Llama,
    Qwen2,
}

impl CandleModelFactory {
    fn detect_architecture(dir: &Path, config: &serde_json::Value) -> Result<Architecture> {
        let model_type = config["model_type"].as_str().unwrap_or("").to_lowercase();
        let arch = config["architectures"]
            .get(0)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();

        if model_type == "qwen2" || arch.contains("qwen2") {
            Ok(Architecture::Qwen2)
        } else if model_type == "llama" || arch.contains("llama") {
            Ok(Architecture::Llama)
        } else {
            Err(StartupError::Model {
                path: dir.to_path_buf(),
                message: format!(
                    "Unsupported model architecture: model_type='{}', architectures='{}'. Supported: llama, qwen2",
                    model_type, arch
                ),
            })
        }
    }
}

impl ModelFactory for CandleModelFactory {
    fn load(&self, dir: &Path, device: &Device, dtype: DType) -> Result<Box<dyn CausalLm>> {
        let config_path = dir.join("config.json");
        let raw = fs::read_to_string(&config_path).map_err(|e| StartupError::io(&config_path, e))?;
        let invalid = |source| StartupError::InvalidConfig {
            path: config_path.clone(),
            source,
        };
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(invalid)?;
        let architecture = Self::detect_architecture(dir, &value)?;

        let weights = weight_files(dir)?;
        let model_error = |e: candle_core::Error| StartupError::Model {
            path: dir.to_path_buf(),
            message: e.to_string(),
        };

        // Safety: the weight files are not modified while they are mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, device) }
            .map_err(model_error)?;

        info!(
            architecture = ?architecture,
            shards = weights.len(),
            dtype = ?dtype,
            "Loading model weights"
        );

        match architecture {
            Architecture::Llama => {
                let config: LlamaConfig = serde_json::from_str(&raw).map_err(invalid)?;
                let runtime = LlamaRuntime::new(config, vb, dtype, device).map_err(model_error)?;
                Ok(Box::new(runtime))
            }
            Architecture::Qwen2 => {
                let config: Qwen2Config = serde_json::from_str(&raw).map_err(invalid)?;
                let runtime = Qwen2Runtime::new(&config, vb).map_err(model_error)?;
                Ok(Box::new(runtime))
            }
        }
    }
}

/// All `*.safetensors` shards in `dir`, sorted by name
fn weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| StartupError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StartupError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("safetensors") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(StartupError::Model {
            path: dir.to_path_buf(),
            message: "no .safetensors weight files found".to_string(),
        });
    }
    Ok(files)
}

/// Load the generation model onto `backend` with the backend's precision.
///
/// Candle weights are immutable constants with no gradient tape, so the
/// loaded model is already in inference mode.
pub fn load_generation_model(
    dir: impl AsRef<Path>,
    backend: ComputeBackend,
    factory: &dyn ModelFactory,
) -> Result<GenerationModel> {
    load_generation_model_on(dir, backend, backend.device()?, factory)
}

/// As [`load_generation_model`], reusing an already opened `device`
pub fn load_generation_model_on(
    dir: impl AsRef<Path>,
    backend: ComputeBackend,
    device: Device,
    factory: &dyn ModelFactory,
) -> Result<GenerationModel> {
    let dir = dir.as_ref();
    let dtype = precision_for(backend);

    let runtime = factory.load(dir, &device, dtype)?;
    let model = GenerationModel::new(runtime, backend, device, dtype);

    info!(
        path = %dir.display(),
        backend = %backend,
        max_positions = model.max_positions(),
        vocab_size = model.vocab_size(),
        "Model loaded"
    );
    Ok(model)
}
