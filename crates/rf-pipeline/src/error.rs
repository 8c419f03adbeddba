//! Taxonomía de errores del pipeline y su clasificación.
//!
//! - `Decode`, `Resolution`, `StateConflict`: terminales y locales (fallan un
//!   único envío, nada se muta).
//! - `TransientStore`, `ComparisonInputMissing`: se reintentan con backoff
//!   acotado; agotado el presupuesto, el trabajo queda estacionado.
//! - `Notification`: la entrega se reintenta en la próxima pasada de reporting.
//! - `Store`: error no transitorio del medio; terminal.

use rf_core::{DecodeError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("unknown destination: {0}")]
    Resolution(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("transient store error: {0}")]
    TransientStore(String),
    #[error("comparison input missing: {0}")]
    ComparisonInputMissing(String),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("queue closed: {0}")]
    QueueClosed(String),
    #[error("notification failed: {0}")]
    Notification(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(m) => PipelineError::TransientStore(m),
            StoreError::Conflict(m) => PipelineError::StateConflict(m),
            other => PipelineError::Store(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Terminal,
    Retryable,
}

pub fn classify(err: &PipelineError) -> ErrorClass {
    match err {
        PipelineError::TransientStore(_) | PipelineError::ComparisonInputMissing(_) | PipelineError::Notification(_) => {
            ErrorClass::Retryable
        }
        PipelineError::Decode(_)
        | PipelineError::Resolution(_)
        | PipelineError::StateConflict(_)
        | PipelineError::Store(_)
        | PipelineError::QueueClosed(_) => ErrorClass::Terminal,
    }
}
