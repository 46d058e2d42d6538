//! Generation model and tokenizer loading

mod loader;
mod runtime;
mod tokenizer;

pub use loader::{load_generation_model, load_generation_model_on, CandleModelFactory, ModelFactory};
pub use runtime::{CausalLm, GenerationModel, LlamaRuntime, Qwen2Runtime};
pub use tokenizer::{load_tokenizer, TextTokenizer};
