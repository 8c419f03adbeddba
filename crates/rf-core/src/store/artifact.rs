use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::StoreError;

/// Servicio clave -> bytes para artifacts.
///
/// Las claves son opacas (`{messageId}/{artifactKey}`); la unicidad es
/// responsabilidad del llamador. Un `put` es todo-o-nada: si falla, la clave
/// queda ausente.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// `StoreError::NotFound` si la clave no existe.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// Devuelve `true` si la clave existía.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("artifact {key}")))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.blobs.remove(key).is_some())
    }
}
