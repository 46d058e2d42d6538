// Location: src/config/mod.rs

mod generation;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StartupError};

pub use generation::{load_generation_config, GenerationConfig, PromptTemplate, DEFAULT_QUERY_TEMPLATE, QUERY_PLACEHOLDER};

/// Chunk size published to downstream document segmentation
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding every startup artifact
    pub model_root: PathBuf,

    /// Artifact locations relative to `model_root`
    pub layout: ArtifactLayout,

    /// Backend preference; `Auto` follows the resolver policy
    pub device: DevicePreference,

    /// Chunk size for document segmentation
    pub chunk_size: usize,

    /// Input token limit used when neither the tokenizer nor the model
    /// declares one
    pub max_input_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactLayout {
    pub index: PathBuf,
    pub generation_model: PathBuf,
    pub tokenizer: PathBuf,
    pub embedding_model: PathBuf,
    pub generation_config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cuda,
    Metal,
    Cpu,
}

impl FromStr for DevicePreference {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" | "mps" => Ok(Self::Metal),
            "cpu" => Ok(Self::Cpu),
            other => Err(StartupError::config_value(
                "device",
                format!("unknown device '{}', expected auto, cuda, metal or cpu", other),
            )),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            index: PathBuf::from("index.pkl"),
            generation_model: PathBuf::from("llm_model"),
            tokenizer: PathBuf::from("llm_tokenizer"),
            embedding_model: PathBuf::from("embedding_model_cpu.pkl"),
            generation_config: PathBuf::from("llm_config.json"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("./models"),
            layout: ArtifactLayout::default(),
            device: DevicePreference::Auto,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_input_length: 2048,
        }
    }
}

impl PipelineConfig {
    pub fn with_model_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.model_root = root.into();
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Defaults overlaid with `MODEL_ROOT` and `COMPUTE_DEVICE`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("MODEL_ROOT") {
            config.model_root = PathBuf::from(root);
        }
        if let Ok(device) = std::env::var("COMPUTE_DEVICE") {
            config.device = device.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn index_path(&self) -> PathBuf {
        self.model_root.join(&self.layout.index)
    }

    pub fn generation_model_path(&self) -> PathBuf {
        self.model_root.join(&self.layout.generation_model)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_root.join(&self.layout.tokenizer)
    }

    pub fn embedding_model_path(&self) -> PathBuf {
        self.model_root.join(&self.layout.embedding_model)
    }

    pub fn generation_config_path(&self) -> PathBuf {
        self.model_root.join(&self.layout.generation_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_root.as_os_str().is_empty() {
            return Err(StartupError::config_value("model_root", "Model root cannot be empty"));
        }

        let layout = [
            ("layout.index", &self.layout.index),
            ("layout.generation_model", &self.layout.generation_model),
            ("layout.tokenizer", &self.layout.tokenizer),
            ("layout.embedding_model", &self.layout.embedding_model),
            ("layout.generation_config", &self.layout.generation_config),
        ];
        for (key, path) in layout {
            if path.as_os_str().is_empty() {
                return Err(StartupError::config_value(key, "Artifact path cannot be empty"));
            }
        }

        if self.chunk_size == 0 {
            return Err(StartupError::config_value("chunk_size", "Chunk size must be positive"));
        }

        if self.max_input_length == 0 {
            return Err(StartupError::config_value(
                "max_input_length",
                "Input length limit must be positive",
            ));
        }

        Ok(())
    }
}
