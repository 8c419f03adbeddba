//! Eventos salientes del pipeline.
//!
//! Los componentes (consumer de comparaciones, ciclo de vida de batches,
//! telemetría) no notifican directamente: agregan un `PipelineEventKind` al
//! `Outbox` y el scheduler de reporting los entrega de forma asíncrona.
//! Serializa como `{ "type": "comparison-ready", "payload": { .. } }`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum PipelineEventKind {
    /// Resultado de comparación persistido.
    ComparisonReady {
        candidate: Uuid,
        baseline: Uuid,
        suite_id: Uuid,
        batch_id: Uuid,
        element_id: Uuid,
        similarity: f64,
        fingerprint: String,
    },
    /// Transición efectiva `Open -> Sealed` (nunca se emite dos veces por batch).
    BatchSealed {
        batch_id: Uuid,
        suite_id: Uuid,
        sealed_at: DateTime<Utc>,
    },
    BaselinePromoted {
        suite_id: Uuid,
        from: Option<Uuid>,
        to: Uuid,
        by: String,
        reason: String,
    },
    UsageReport {
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        messages: usize,
        comparisons: usize,
        sealed_batches: usize,
    },
}

impl PipelineEventKind {
    /// Nombre estable del tipo (coincide con el tag serializado).
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEventKind::ComparisonReady { .. } => "comparison-ready",
            PipelineEventKind::BatchSealed { .. } => "batch-sealed",
            PipelineEventKind::BaselinePromoted { .. } => "baseline-promoted",
            PipelineEventKind::UsageReport { .. } => "usage-report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub seq: u64, // asignado por el Outbox (orden append)
    pub kind: PipelineEventKind,
    pub ts: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_and_payload() {
        let kind = PipelineEventKind::BatchSealed { batch_id: Uuid::nil(),
                                                    suite_id: Uuid::nil(),
                                                    sealed_at: Utc::now() };
        let v = serde_json::to_value(&kind).unwrap();
        assert_eq!(v["type"], "batch-sealed");
        assert_eq!(v["type"], kind.type_name());
        assert!(v["payload"]["batch_id"].is_string());
    }
}
