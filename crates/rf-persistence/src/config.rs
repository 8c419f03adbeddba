//! Configuración de almacenamiento desde variables de entorno.
//!
//! `DATABASE_URL` es opcional: si está definida se usa el store de artifacts
//! en Postgres, si no el de filesystem bajo `ARTIFACT_DIR`.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

pub const DEFAULT_ARTIFACT_DIR: &str = "./artifacts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub artifact_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_url: None,
               min_connections: 2,
               max_connections: 16,
               artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR) }
    }
}

fn pool_size(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

impl StoreConfig {
    /// Lee el entorno (y `.env` la primera vez). Valores ilegibles caen al
    /// default en lugar de fallar.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let base = Self::default();
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        let artifact_dir = env::var_os("ARTIFACT_DIR").map(PathBuf::from).unwrap_or(base.artifact_dir);
        Self { database_url,
               min_connections: pool_size("DATABASE_MIN_CONNECTIONS", base.min_connections),
               max_connections: pool_size("DATABASE_MAX_CONNECTIONS", base.max_connections),
               artifact_dir }
    }

    pub fn uses_postgres(&self) -> bool {
        self.database_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_pool_size_falls_back() {
        assert_eq!(pool_size("RF_TEST_POOL_SIZE_UNSET", 7), 7);
    }

    #[test]
    fn defaults_point_to_filesystem() {
        let cfg = StoreConfig::default();
        assert!(!cfg.uses_postgres());
        assert_eq!(cfg.artifact_dir, PathBuf::from(DEFAULT_ARTIFACT_DIR));
    }
}
