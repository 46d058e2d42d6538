//! Opaque binary artifacts consumed by retrieval collaborators.
//!
//! The index and the embedding model are produced elsewhere; this crate only
//! checks that they exist and are non-empty, then hands out shared bytes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, StartupError};

/// Raw bytes of a persisted artifact
#[derive(Debug, Clone)]
pub struct OpaqueArtifact {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl OpaqueArtifact {
    fn read(path: &Path, label: &str) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| StartupError::io(path, e))?;
        if bytes.is_empty() {
            return Err(StartupError::CorruptArtifact {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }

        info!(path = %path.display(), bytes = bytes.len(), "{} loaded", label);
        Ok(Self {
            path: path.to_path_buf(),
            bytes: bytes.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Handle to the persisted retrieval index
#[derive(Debug, Clone)]
pub struct RetrievalIndex(OpaqueArtifact);

/// Handle to the persisted embedding model; always CPU-resident
#[derive(Debug, Clone)]
pub struct EmbeddingModel(OpaqueArtifact);

impl RetrievalIndex {
    pub fn artifact(&self) -> &OpaqueArtifact {
        &self.0
    }
}

impl EmbeddingModel {
    pub fn artifact(&self) -> &OpaqueArtifact {
        &self.0
    }
}

pub fn load_index(path: impl AsRef<Path>) -> Result<RetrievalIndex> {
    OpaqueArtifact::read(path.as_ref(), "Vector index").map(RetrievalIndex)
}

pub fn load_embedding_model(path: impl AsRef<Path>) -> Result<EmbeddingModel> {
    OpaqueArtifact::read(path.as_ref(), "Embedding model").map(EmbeddingModel)
}
