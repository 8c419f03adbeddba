//! rf-persistence
//!
//! Implementaciones durables del `ArtifactStore` del core:
//! - `fs`: archivos bajo un directorio raíz (escritura temp + rename).
//! - `pg`: tabla `artifact_blobs` en Postgres vía Diesel + r2d2, con
//!   migraciones embebidas.
//!
//! `open_artifact_store` elige el backend según `StoreConfig`.

pub mod config;
pub mod error;
pub mod fs;
pub mod migrations;
pub mod pg;
pub mod retry;
pub mod schema;

use log::info;
use rf_core::ArtifactStore;
use std::sync::Arc;

pub use config::StoreConfig;
pub use error::PersistenceError;
pub use fs::FsArtifactStore;
pub use pg::{build_pool, ConnectionProvider, PgArtifactStore, PgPool, PoolProvider};

/// Postgres si hay `DATABASE_URL`, filesystem en otro caso.
pub fn open_artifact_store(cfg: &StoreConfig) -> Result<Arc<dyn ArtifactStore>, PersistenceError> {
    match pg::build_pool_from_config(cfg)? {
        Some(pool) => {
            info!("artifact store: postgres (max_connections={})", cfg.max_connections);
            Ok(Arc::new(PgArtifactStore::new(PoolProvider { pool })))
        }
        None => {
            info!("artifact store: filesystem at {}", cfg.artifact_dir.display());
            Ok(Arc::new(FsArtifactStore::new(cfg.artifact_dir.clone())))
        }
    }
}
