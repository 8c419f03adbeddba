//! resultflow
//!
//! Librería raíz del servicio:
//! - `config`: configuración de la aplicación (`AppConfig`).
//! - `errors`: error de aplicación (`AppError`).
//! - `start_service`: arma stores, colas, consumers y schedulers.
//!
//! Re-exporta los crates del workspace para clientes que sólo dependen de
//! `resultflow`.

pub mod config;
pub mod errors;

pub use rf_core as core;
pub use rf_persistence as persistence;
pub use rf_pipeline as pipeline;

use log::info;
use rf_core::{InMemoryMetadataStore, InMemoryOutbox};
use rf_pipeline::{LogNotifier, PipelineService, Stores};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::AppError;

/// Stores del servicio: artifacts durables según configuración; metadatos
/// y outbox en memoria.
pub fn build_stores(config: &AppConfig) -> Result<Stores, AppError> {
    let artifacts = rf_persistence::open_artifact_store(&config.store)?;
    Ok(Stores { metadata: Arc::new(InMemoryMetadataStore::new()),
                artifacts,
                outbox: Arc::new(InMemoryOutbox::new()),
                notifier: Arc::new(LogNotifier) })
}

pub async fn start_service(config: &AppConfig, stores: Stores) -> Result<PipelineService, AppError> {
    info!("starting pipeline (workers={}, allow_overwrite={})",
          config.pipeline.comparison_workers,
          config.pipeline.allow_overwrite);
    Ok(PipelineService::start(&config.pipeline, stores).await?)
}
