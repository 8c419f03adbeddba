//! Configuración central de la aplicación: une la configuración del
//! pipeline (intervalos, reintentos, overwrite) con la de almacenamiento
//! (Postgres o directorio de artifacts).
use rf_persistence::StoreConfig;
use rf_pipeline::PipelineConfig;

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Lee `.env` (una sola vez) y las variables del entorno.
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self { pipeline: PipelineConfig::from_env()?,
                  store: StoreConfig::from_env() })
    }
}
