//! Tipos del resultado de una comparación.
//!
//! Un `ComparisonResult` es función pura de sus dos mensajes de entrada: se
//! recalcula, nunca se edita. Todas las colecciones son `Vec` ordenados de
//! forma determinista (orden de claves del candidato para `common`/`fresh`,
//! orden del baseline para `missing`) para que la serialización sea
//! reproducible byte a byte.
use serde::{Deserialize, Serialize};

use crate::hashing::{blake3_hex, fingerprint_json};
use crate::value::{ResultValue, ValueKind};

/// Clasificación de un par de valores presentes en ambos lados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Match,
    /// Mismo tipo declarado, distinto valor.
    ValueMismatch,
    /// Tipos declarados distintos; nunca coincide.
    TypeMismatch { candidate: ValueKind, baseline: ValueKind },
    /// Objeto con al menos una sub-clave distinta, nueva o faltante.
    NestedMismatch(ObjectDiff),
    /// Arreglo con elementos distintos o con distinta longitud.
    ArrayMismatch(ArrayDiff),
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

/// Partición de las sub-claves de un objeto. `entries` incluye TODAS las
/// sub-claves comunes (también las que coinciden).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDiff {
    pub entries: Vec<KeyVerdict>,
    pub fresh: Vec<String>,
    pub missing: Vec<String>,
}

impl ObjectDiff {
    pub fn is_clean(&self) -> bool {
        self.fresh.is_empty() && self.missing.is_empty() && self.entries.iter().all(|e| e.verdict.is_match())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVerdict {
    pub key: String,
    pub verdict: Verdict,
}

/// Diferencia entre dos arreglos. `elements` contiene sólo los índices
/// comunes que no coinciden; la diferencia de longitud es estructural y se
/// reporta aparte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayDiff {
    pub candidate_len: usize,
    pub baseline_len: usize,
    pub elements: Vec<IndexVerdict>,
}

impl ArrayDiff {
    pub fn length_mismatch(&self) -> bool {
        self.candidate_len != self.baseline_len
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexVerdict {
    pub index: usize,
    pub verdict: Verdict,
}

/// Clave presente en ambos mensajes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonEntry {
    pub key: String,
    pub candidate: ResultValue,
    pub baseline: ResultValue,
    pub verdict: Verdict,
}

/// Clave presente sólo en un lado (`fresh` o `missing`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoloEntry {
    pub key: String,
    pub value: ResultValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOverview {
    /// |common| + |fresh| + |missing|
    pub keys_count: usize,
    pub keys_matched: usize,
    pub keys_mismatched: usize,
    pub keys_fresh: usize,
    pub keys_missing: usize,
    /// matched / keys_count en [0, 1]; 1.0 si no hay claves.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub name: String,
    pub candidate: i64,
    pub baseline: i64,
    /// candidate - baseline
    pub delta: i64,
    /// Cambio porcentual respecto del baseline; `None` si el baseline es 0.
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoloMetric {
    pub name: String,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsOverview {
    pub metrics_common: usize,
    pub metrics_fresh: usize,
    pub metrics_missing: usize,
    /// Suma de duraciones del candidato (todas sus métricas).
    pub candidate_duration: i64,
    pub baseline_duration: i64,
    pub duration_delta: i64,
    pub change_percent: Option<f64>,
}

/// Comparación de métricas: diferencias de duración, no errores de
/// correctitud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsComparison {
    pub common: Vec<MetricDelta>,
    pub fresh: Vec<SoloMetric>,
    pub missing: Vec<SoloMetric>,
    pub overview: MetricsOverview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub engine_version: String,
    pub common: Vec<CommonEntry>,
    pub fresh: Vec<SoloEntry>,
    pub missing: Vec<SoloEntry>,
    pub overview: ComparisonOverview,
    pub metrics: MetricsComparison,
}

impl ComparisonResult {
    /// Hash blake3 del JSON canónico del resultado. Dos ejecuciones sobre las
    /// mismas entradas producen el mismo fingerprint.
    pub fn fingerprint(&self) -> String {
        match serde_json::to_value(self) {
            Ok(v) => fingerprint_json(&v),
            Err(_) => blake3_hex(format!("{self:?}").as_bytes()),
        }
    }

    pub fn is_identical(&self) -> bool {
        self.overview.keys_mismatched == 0 && self.fresh.is_empty() && self.missing.is_empty()
    }
}

pub(crate) fn percent_change(candidate: i64, baseline: i64) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    let delta = candidate as f64 - baseline as f64;
    Some(delta / baseline as f64 * 100.0)
}
