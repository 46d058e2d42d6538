//! Completion bootstrap - startup and request-time generation for a
//! retrieval-augmented assistant
//!
//! Startup resolves the compute backend, loads the persisted retrieval
//! artifacts plus a causal language model and its tokenizer, binds them into
//! a [`GenerationEngine`] and publishes process-wide [`Settings`]. At request
//! time [`generate`] turns a prompt into newly generated text.
//!
//! ```no_run
//! use completion_bootstrap::{initialize_all, DEFAULT_MAX_TOKENS};
//!
//! let bundle = initialize_all()?;
//! let answer = bundle.generate("What is the capital of France?", DEFAULT_MAX_TOKENS);
//! # Ok::<(), completion_bootstrap::StartupError>(())
//! ```

// Public modules
pub mod artifacts;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod processing;
pub mod settings;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for public API
pub use artifacts::{EmbeddingModel, RetrievalIndex};
pub use config::{GenerationConfig, PipelineConfig};
pub use device::{precision_for, resolve, ComputeBackend};
pub use engine::{EngineBuilder, GenerationEngine};
pub use error::{GenerationError, QueueError, StartupError};
pub use generation::{generate, generate_with, GenerationOptions, SamplingParams, DEFAULT_MAX_TOKENS};
pub use model::{GenerationModel, TextTokenizer};
pub use pipeline::{initialize_all, ArtifactBundle, Pipeline};
pub use processing::GenerationQueue;
pub use settings::{Settings, SettingsRegistry};
pub use types::{Completion, QueueHandle};
