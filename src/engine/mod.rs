//! Engine module providing the callable completion interface

mod builder;
mod engine;

pub use builder::EngineBuilder;
pub use engine::GenerationEngine;
