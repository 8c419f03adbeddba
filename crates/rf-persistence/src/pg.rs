//! `ArtifactStore` sobre Postgres (Diesel + r2d2).
//!
//! Los blobs viven en la tabla `artifact_blobs` (`bytea`). Diesel es
//! bloqueante: cada operación corre en `spawn_blocking` y usa `with_retry`
//! para errores transitorios de conexión/serialización.
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use rf_core::{ArtifactStore, StoreError};
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::retry::with_retry;
use crate::schema::artifact_blobs;

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o uno de test).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::Unavailable(format!("pool error: {e}")))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = artifact_blobs)]
struct NewBlobRow<'a> {
    key: &'a str,
    content: &'a [u8],
    length: i64,
}

pub struct PgArtifactStore<P: ConnectionProvider> {
    provider: Arc<P>,
}

impl<P: ConnectionProvider> PgArtifactStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider: Arc::new(provider) }
    }

    async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
        where T: Send + 'static,
              F: Fn(&mut PgConnection) -> Result<T, PersistenceError> + Send + 'static
    {
        let provider = self.provider.clone();
        let joined = tokio::task::spawn_blocking(move || {
                         with_retry(|| {
                             let mut conn = provider.connection()?;
                             f(&mut conn)
                         })
                     }).await;
        match joined {
            Ok(result) => result.map_err(|e| {
                                    warn!("pg artifact {op} failed: {e}");
                                    StoreError::from(e)
                                }),
            Err(join) => Err(StoreError::Internal(format!("pg artifact {op} task: {join}"))),
        }
    }
}

#[async_trait]
impl<P: ConnectionProvider> ArtifactStore for PgArtifactStore<P> {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let key = key.to_string();
        let content = bytes.to_vec();
        let length = i64::try_from(content.len()).map_err(|_| StoreError::Internal(format!("artifact {key} too large")))?;
        debug!("pg artifact put key={key} len={length}");
        self.run_blocking("put", move |conn| {
                let row = NewBlobRow { key: &key,
                                       content: &content,
                                       length };
                diesel::insert_into(artifact_blobs::table).values(&row)
                                                          .on_conflict(artifact_blobs::key)
                                                          .do_update()
                                                          .set((artifact_blobs::content.eq(content.as_slice()),
                                                                artifact_blobs::length.eq(length)))
                                                          .execute(conn)
                                                          .map(|_| ())
                                                          .map_err(PersistenceError::from)
            })
            .await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let owned = key.to_string();
        let found: Option<Vec<u8>> = self.run_blocking("get", move |conn| {
                                             artifact_blobs::table.filter(artifact_blobs::key.eq(&owned))
                                                                  .select(artifact_blobs::content)
                                                                  .first::<Vec<u8>>(conn)
                                                                  .optional()
                                                                  .map_err(PersistenceError::from)
                                         })
                                         .await?;
        found.ok_or_else(|| StoreError::NotFound(format!("artifact {key}")))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let owned = key.to_string();
        let deleted = self.run_blocking("delete", move |conn| {
                              diesel::delete(artifact_blobs::table.filter(artifact_blobs::key.eq(&owned)))
                                  .execute(conn)
                                  .map_err(PersistenceError::from)
                          })
                          .await?;
        Ok(deleted > 0)
    }
}

/// Construye un pool Postgres r2d2 y corre las migraciones pendientes.
///
/// Si `min_size > max_size` se usa `min = max`; tamaños 0 se elevan a 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::Unavailable(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::Unavailable(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Pool a partir de `StoreConfig`; `None` si no hay `DATABASE_URL`.
pub fn build_pool_from_config(cfg: &StoreConfig) -> Result<Option<PgPool>, PersistenceError> {
    match &cfg.database_url {
        Some(url) => build_pool(url, cfg.min_connections, cfg.max_connections).map(Some),
        None => Ok(None),
    }
}
