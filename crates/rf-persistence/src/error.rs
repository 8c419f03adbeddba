//! Errores de los backends de artifacts y su traducción a `StoreError`.
//!
//! Diesel, r2d2 e IO se reducen a pocas categorías: lo que vale la pena
//! reintentar (`Unavailable`), violaciones de restricciones, claves
//! inválidas y el resto.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rf_core::StoreError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("artifact not found: {0}")]
    Missing(String),
    #[error("constraint {constraint} violated: {detail}")]
    Constraint { constraint: &'static str, detail: String },
    /// Pool agotado, conexión caída, conflicto de serialización.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid artifact key: {0:?}")]
    InvalidKey(String),
    #[error("artifact io: {0}")]
    Io(#[from] io::Error),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("database error: {0}")]
    Database(String),
}

// Mensajes de driver que llegan sin un `DatabaseErrorKind` propio.
const RETRYABLE_DRIVER_MESSAGES: [&str; 4] = ["deadlock detected", "could not serialize access", "connection", "timeout"];

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::Unavailable(_) => true,
            PersistenceError::Io(e) => {
                matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
            }
            PersistenceError::Database(msg) => {
                let msg = msg.to_lowercase();
                RETRYABLE_DRIVER_MESSAGES.iter().any(|m| msg.contains(m))
            }
            _ => false,
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        let DieselError::DatabaseError(kind, info) = err else {
            return match err {
                DieselError::NotFound => Self::Missing("no row".into()),
                DieselError::BrokenTransactionManager => Self::Unavailable("transaction manager broken".into()),
                other => Self::Database(other.to_string()),
            };
        };
        let detail = info.message().to_string();
        match kind {
            DatabaseErrorKind::UniqueViolation => Self::Constraint { constraint: "unique",
                                                                     detail },
            DatabaseErrorKind::CheckViolation => Self::Constraint { constraint: "check",
                                                                    detail },
            DatabaseErrorKind::SerializationFailure | DatabaseErrorKind::ClosedConnection => Self::Unavailable(detail),
            _ => Self::Database(detail),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        if err.is_retryable() {
            return StoreError::Transient(err.to_string());
        }
        match err {
            PersistenceError::Missing(key) => StoreError::NotFound(key),
            PersistenceError::Constraint { constraint: "unique", detail } => StoreError::Conflict(detail),
            other => StoreError::Internal(other.to_string()),
        }
    }
}
