use rf_persistence::PersistenceError;
use rf_pipeline::{ConfigError, PipelineError};
use thiserror::Error;

/// Errores de arranque y operación del servicio.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(#[from] ConfigError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error del pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
}
