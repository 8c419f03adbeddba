//! Motor de comparación candidato vs baseline.
//!
//! Algoritmo:
//! 1. Partición de claves de resultados en `common` / `fresh` / `missing`.
//! 2. Clasificación recursiva de cada par común (`Verdict`).
//! 3. Overview agregado con similitud = matched / total.
//! 4. Métricas por separado: delta con signo y cambio porcentual.
//!
//! La comparación es total: para entradas bien formadas nunca falla.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::result::*;
use crate::constants::ENGINE_VERSION;
use crate::message::DecodedMessage;
use crate::value::{f64_identical, ResultValue};

/// Regla de igualdad para `Float`/`Double`.
///
/// Es el punto de configuración de tolerancia: hoy sólo existe la igualdad
/// numérica exacta, de modo que los resultados son deterministas y
/// auditables.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FloatRule {
    /// `a == b` numérico (0.0 == -0.0) o bits idénticos: un NaN estable
    /// coincide consigo mismo.
    #[default]
    Exact,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompareOptions {
    pub float_rule: FloatRule,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ComparisonEngine {
    options: CompareOptions,
}

impl ComparisonEngine {
    pub fn new(options: CompareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CompareOptions {
        self.options
    }

    pub fn compare(&self, candidate: &DecodedMessage, baseline: &DecodedMessage) -> ComparisonResult {
        let mut common = Vec::new();
        let mut fresh = Vec::new();
        for (key, c) in &candidate.results {
            match baseline.results.get(key) {
                Some(b) => common.push(CommonEntry { key: key.clone(),
                                                     candidate: c.clone(),
                                                     baseline: b.clone(),
                                                     verdict: self.compare_values(c, b) }),
                None => fresh.push(SoloEntry { key: key.clone(),
                                               value: c.clone() }),
            }
        }
        let missing: Vec<SoloEntry> = baseline.results
                                              .iter()
                                              .filter(|(k, _)| !candidate.results.contains_key(*k))
                                              .map(|(k, v)| SoloEntry { key: k.clone(), value: v.clone() })
                                              .collect();

        let keys_matched = common.iter().filter(|e| e.verdict.is_match()).count();
        let keys_count = common.len() + fresh.len() + missing.len();
        let similarity = if keys_count == 0 {
            1.0
        } else {
            keys_matched as f64 / keys_count as f64
        };
        let overview = ComparisonOverview { keys_count,
                                            keys_matched,
                                            keys_mismatched: common.len() - keys_matched,
                                            keys_fresh: fresh.len(),
                                            keys_missing: missing.len(),
                                            similarity };

        ComparisonResult { engine_version: ENGINE_VERSION.to_string(),
                           common,
                           fresh,
                           missing,
                           overview,
                           metrics: compare_metrics(&candidate.metrics, &baseline.metrics) }
    }

    pub fn compare_values(&self, candidate: &ResultValue, baseline: &ResultValue) -> Verdict {
        use ResultValue::*;
        let equal = match (candidate, baseline) {
            (Bool(c), Bool(b)) => c == b,
            (Int(c), Int(b)) => c == b,
            (UInt(c), UInt(b)) => c == b,
            (Float(c), Float(b)) => self.floats_equal(f64::from(*c), f64::from(*b)),
            (Double(c), Double(b)) => self.floats_equal(*c, *b),
            (String(c), String(b)) => c == b,
            (Blob(c), Blob(b)) => c == b,
            (Object(c), Object(b)) => {
                let diff = self.compare_objects(c, b);
                return if diff.is_clean() { Verdict::Match } else { Verdict::NestedMismatch(diff) };
            }
            (Array(c), Array(b)) => return self.compare_arrays(c, b),
            _ => {
                return Verdict::TypeMismatch { candidate: candidate.kind(),
                                               baseline: baseline.kind() }
            }
        };
        if equal {
            Verdict::Match
        } else {
            Verdict::ValueMismatch
        }
    }

    fn floats_equal(&self, c: f64, b: f64) -> bool {
        match self.options.float_rule {
            FloatRule::Exact => f64_identical(c, b),
        }
    }

    // Sin cortocircuito: cada sub-clave queda reportada aunque otra ya difiera.
    fn compare_objects(&self,
                       candidate: &IndexMap<String, ResultValue>,
                       baseline: &IndexMap<String, ResultValue>)
                       -> ObjectDiff {
        let mut diff = ObjectDiff::default();
        for (key, c) in candidate {
            match baseline.get(key) {
                Some(b) => diff.entries.push(KeyVerdict { key: key.clone(),
                                                          verdict: self.compare_values(c, b) }),
                None => diff.fresh.push(key.clone()),
            }
        }
        diff.missing = baseline.keys().filter(|k| !candidate.contains_key(*k)).cloned().collect();
        diff
    }

    fn compare_arrays(&self, candidate: &[ResultValue], baseline: &[ResultValue]) -> Verdict {
        let elements: Vec<IndexVerdict> = candidate.iter()
                                                   .zip(baseline.iter())
                                                   .enumerate()
                                                   .map(|(index, (c, b))| IndexVerdict { index,
                                                                                        verdict: self.compare_values(c, b) })
                                                   .filter(|iv| !iv.verdict.is_match())
                                                   .collect();
        if elements.is_empty() && candidate.len() == baseline.len() {
            return Verdict::Match;
        }
        Verdict::ArrayMismatch(ArrayDiff { candidate_len: candidate.len(),
                                           baseline_len: baseline.len(),
                                           elements })
    }
}

fn compare_metrics(candidate: &IndexMap<String, i64>, baseline: &IndexMap<String, i64>) -> MetricsComparison {
    let mut common = Vec::new();
    let mut fresh = Vec::new();
    for (name, c) in candidate {
        match baseline.get(name) {
            Some(b) => common.push(MetricDelta { name: name.clone(),
                                                 candidate: *c,
                                                 baseline: *b,
                                                 delta: c.saturating_sub(*b),
                                                 change_percent: percent_change(*c, *b) }),
            None => fresh.push(SoloMetric { name: name.clone(),
                                            duration: *c }),
        }
    }
    let missing: Vec<SoloMetric> = baseline.iter()
                                           .filter(|(k, _)| !candidate.contains_key(*k))
                                           .map(|(k, v)| SoloMetric { name: k.clone(), duration: *v })
                                           .collect();

    let candidate_duration = candidate.values().fold(0i64, |acc, v| acc.saturating_add(*v));
    let baseline_duration = baseline.values().fold(0i64, |acc, v| acc.saturating_add(*v));
    let overview = MetricsOverview { metrics_common: common.len(),
                                     metrics_fresh: fresh.len(),
                                     metrics_missing: missing.len(),
                                     candidate_duration,
                                     baseline_duration,
                                     duration_delta: candidate_duration.saturating_sub(baseline_duration),
                                     change_percent: percent_change(candidate_duration, baseline_duration) };
    MetricsComparison { common,
                        fresh,
                        missing,
                        overview }
}

/// Compara con las opciones por defecto (`FloatRule::Exact`).
pub fn compare(candidate: &DecodedMessage, baseline: &DecodedMessage) -> ComparisonResult {
    ComparisonEngine::default().compare(candidate, baseline)
}
