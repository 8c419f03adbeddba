//! Registros derivados: comparaciones, promociones de baseline y jobs
//! estacionados (dead-letter).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::compare::ComparisonResult;

/// Identidad de una comparación: par ordenado (candidato, baseline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComparisonKey {
    pub candidate: Uuid,
    pub baseline: Uuid,
}

impl ComparisonKey {
    pub fn new(candidate: Uuid, baseline: Uuid) -> Self {
        Self { candidate, baseline }
    }
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.candidate, self.baseline)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComparisonState {
    /// Encolada, todavía sin resultado.
    Pending,
    Ready(ComparisonResult),
    /// El baseline no estuvo disponible tras agotar los reintentos.
    PendingNoBaseline,
    /// Job estacionado; ver `FailedJob`.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub key: ComparisonKey,
    /// Versión del mensaje candidato con la que se calculó.
    pub candidate_version: u64,
    pub state: ComparisonState,
    pub reported: bool,
    pub updated_at: DateTime<Utc>,
}

impl ComparisonRecord {
    pub fn pending(key: ComparisonKey, candidate_version: u64, at: DateTime<Utc>) -> Self {
        Self { key,
               candidate_version,
               state: ComparisonState::Pending,
               reported: false,
               updated_at: at }
    }

    pub fn ready(key: ComparisonKey, candidate_version: u64, result: ComparisonResult, at: DateTime<Utc>) -> Self {
        Self { key,
               candidate_version,
               state: ComparisonState::Ready(result),
               reported: false,
               updated_at: at }
    }

    pub fn result(&self) -> Option<&ComparisonResult> {
        match &self.state {
            ComparisonState::Ready(r) => Some(r),
            _ => None,
        }
    }
}

/// Entrada del historial de promociones de baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub from: Option<Uuid>,
    pub to: Uuid,
    pub by: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl PromotionRecord {
    /// Clave del anuncio `baseline-promoted` de esta promoción.
    pub fn announcement_key(&self) -> String {
        format!("baseline-promoted/{}", self.id)
    }
}

/// Job de comparación que agotó su presupuesto de reintentos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    pub key: ComparisonKey,
    pub candidate_version: u64,
    pub attempts: u32,
    pub last_error: String,
    pub parked_at: DateTime<Utc>,
}
