//! `ArtifactStore` sobre filesystem.
//!
//! Cada clave `{messageId}/{artifactKey}` se mapea a un archivo bajo `root`.
//! La escritura es a un archivo temporal en el mismo directorio seguida de
//! `rename`, de modo que un `put` interrumpido nunca deja la clave visible con
//! contenido parcial.
use async_trait::async_trait;
use log::debug;
use rf_core::{ArtifactStore, StoreError};
use std::io;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::PersistenceError;

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resuelve la ruta de una clave. Rechaza claves vacías, absolutas o con
    /// componentes `..`/`.` que escaparían de `root`.
    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        if key.is_empty() {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let parent = path.parent()
                     .ok_or_else(|| PersistenceError::InvalidKey(path.display().to_string()))?;
    tokio::fs::create_dir_all(parent).await?;
    let file_name = path.file_name()
                        .ok_or_else(|| PersistenceError::InvalidKey(path.display().to_string()))?
                        .to_string_lossy()
                        .into_owned();
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        write_atomic(&path, bytes).await?;
        debug!("fs artifact put key={key} len={}", bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(format!("artifact {key}"))),
            Err(e) => Err(PersistenceError::from(e).into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::from(e).into()),
        }
    }
}
