//! Process-wide defaults shared with retrieval collaborators

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::info;

use crate::artifacts::EmbeddingModel;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::engine::GenerationEngine;
use crate::error::{Result, StartupError};

lazy_static! {
    static ref GLOBAL_SETTINGS: SettingsRegistry = SettingsRegistry::new();
}

/// Defaults published once the pipeline is fully built
#[derive(Debug)]
pub struct Settings {
    pub embed_model: Arc<EmbeddingModel>,
    pub engine: Arc<GenerationEngine>,
    pub chunk_size: usize,
}

/// Write-once slot holding the published [`Settings`].
///
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    slot: Arc<RwLock<Option<Arc<Settings>>>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static SettingsRegistry {
        &GLOBAL_SETTINGS
    }

    /// Publish the defaults with the standard chunk size
    pub fn register(&self, embed_model: Arc<EmbeddingModel>, engine: Arc<GenerationEngine>) -> Result<Arc<Settings>> {
        self.register_with_chunk_size(embed_model, engine, DEFAULT_CHUNK_SIZE)
    }

    pub fn register_with_chunk_size(
        &self,
        embed_model: Arc<EmbeddingModel>,
        engine: Arc<GenerationEngine>,
        chunk_size: usize,
    ) -> Result<Arc<Settings>> {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return Err(StartupError::AlreadyRegistered);
        }

        let settings = Arc::new(Settings {
            embed_model,
            engine,
            chunk_size,
        });
        *slot = Some(settings.clone());

        info!(chunk_size, "Global settings registered");
        Ok(settings)
    }

    pub fn current(&self) -> Option<Arc<Settings>> {
        self.slot.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::load_embedding_model;
    use crate::testing::{scripted_engine, ScriptedLm};
    use std::fs;
    use tempfile::tempdir;

    fn parts(dir: &std::path::Path) -> (Arc<EmbeddingModel>, Arc<GenerationEngine>) {
        let embed_path = dir.join("embedding_model_cpu.pkl");
        fs::write(&embed_path, b"embedding").unwrap();
        let embed_model = load_embedding_model(&embed_path).unwrap();
        let engine = scripted_engine(&dir.join("tok"), ScriptedLm::new(vec![]));

        (Arc::new(embed_model), Arc::new(engine))
    }

    #[test]
    fn test_register_once() {
        let dir = tempdir().unwrap();
        let registry = SettingsRegistry::new();
        assert!(registry.current().is_none());

        let (embed_model, engine) = parts(dir.path());
        let settings = registry.register(embed_model.clone(), engine.clone()).unwrap();
        assert_eq!(settings.chunk_size, 1024);
        assert!(Arc::ptr_eq(&registry.current().unwrap().engine, &engine));

        let second = registry.register(embed_model, engine);
        assert!(matches!(second, Err(StartupError::AlreadyRegistered)));
    }

    #[test]
    fn test_clones_share_slot() {
        let dir = tempdir().unwrap();
        let registry = SettingsRegistry::new();
        let clone = registry.clone();

        let (embed_model, engine) = parts(dir.path());
        clone.register_with_chunk_size(embed_model, engine, 512).unwrap();

        assert!(registry.is_registered());
        assert_eq!(registry.current().unwrap().chunk_size, 512);
    }
}
