//! Agregados por batch y por element. Es una caché derivable: cada pasada
//! la recalcula desde cero a partir de mensajes y comparaciones.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rf_core::{MessageRecord, MetadataStore, StoreError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{all_messages, SweepTask};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub suite_id: Uuid,
    pub messages: usize,
    pub comparisons: usize,
    /// `None` si ningún mensaje del batch tiene comparación lista.
    pub average_similarity: Option<f64>,
    pub metrics_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementSummary {
    pub element_id: Uuid,
    pub suite_id: Uuid,
    pub messages: usize,
    pub comparisons: usize,
    pub average_similarity: Option<f64>,
    pub metrics_duration: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub computed_at: Option<DateTime<Utc>>,
    pub batches: Vec<BatchSummary>,
    pub elements: Vec<ElementSummary>,
}

impl AnalyticsSnapshot {
    pub fn batch(&self, id: Uuid) -> Option<&BatchSummary> {
        self.batches.iter().find(|b| b.batch_id == id)
    }

    pub fn element(&self, id: Uuid) -> Option<&ElementSummary> {
        self.elements.iter().find(|e| e.element_id == id)
    }
}

#[derive(Debug, Default)]
pub struct AnalyticsCache {
    snapshot: RwLock<AnalyticsSnapshot>,
}

impl AnalyticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> AnalyticsSnapshot {
        self.snapshot.read().await.clone()
    }

    async fn replace(&self, snapshot: AnalyticsSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

struct Totals {
    suite_id: Uuid,
    messages: usize,
    similarities: Vec<f64>,
    metrics_duration: i64,
}

fn totals(group: &[&MessageRecord], similarity: &HashMap<Uuid, f64>) -> Totals {
    Totals { suite_id: group.first().map(|m| m.suite_id).unwrap_or_default(),
             messages: group.len(),
             similarities: group.iter().filter_map(|m| similarity.get(&m.id).copied()).collect(),
             metrics_duration: group.iter()
                                    .fold(0i64, |acc, m| acc.saturating_add(m.overview.metrics_duration)) }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Cálculo puro, paralelizado con rayon por grupo.
pub(crate) fn summarize(messages: &[MessageRecord], similarity: &HashMap<Uuid, f64>, now: DateTime<Utc>)
                        -> AnalyticsSnapshot {
    let mut by_batch: BTreeMap<Uuid, Vec<&MessageRecord>> = BTreeMap::new();
    let mut by_element: BTreeMap<Uuid, Vec<&MessageRecord>> = BTreeMap::new();
    for m in messages {
        by_batch.entry(m.batch_id).or_default().push(m);
        by_element.entry(m.element_id).or_default().push(m);
    }
    let batches = by_batch.par_iter()
                          .map(|(id, group)| {
                              let t = totals(group, similarity);
                              BatchSummary { batch_id: *id,
                                             suite_id: t.suite_id,
                                             messages: t.messages,
                                             comparisons: t.similarities.len(),
                                             average_similarity: average(&t.similarities),
                                             metrics_duration: t.metrics_duration }
                          })
                          .collect();
    let elements = by_element.par_iter()
                             .map(|(id, group)| {
                                 let t = totals(group, similarity);
                                 ElementSummary { element_id: *id,
                                                  suite_id: t.suite_id,
                                                  messages: t.messages,
                                                  comparisons: t.similarities.len(),
                                                  average_similarity: average(&t.similarities),
                                                  metrics_duration: t.metrics_duration }
                             })
                             .collect();
    AnalyticsSnapshot { computed_at: Some(now),
                        batches,
                        elements }
}

pub struct AnalyticsTask {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<AnalyticsCache>,
}

impl AnalyticsTask {
    pub fn new(metadata: Arc<dyn MetadataStore>, cache: Arc<AnalyticsCache>) -> Self {
        Self { metadata, cache }
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let messages = all_messages(self.metadata.as_ref()).await?;
        // Similitud de la comparación lista de cada candidato; si hubiera más
        // de una, gana la más reciente.
        let mut ready: Vec<_> = self.metadata
                                    .list_comparisons()
                                    .await?
                                    .into_iter()
                                    .filter_map(|r| r.result().map(|res| (r.key.candidate, r.updated_at, res.overview.similarity)))
                                    .collect();
        ready.sort_by_key(|(_, at, _)| *at);
        let similarity: HashMap<Uuid, f64> = ready.into_iter().map(|(id, _, s)| (id, s)).collect();

        let snapshot = tokio::task::spawn_blocking(move || summarize(&messages, &similarity, now))
            .await
            .map_err(|e| PipelineError::Store(StoreError::Internal(format!("analytics task: {e}"))))?;
        let groups = snapshot.batches.len();
        self.cache.replace(snapshot).await;
        Ok(groups)
    }
}

#[async_trait]
impl SweepTask for AnalyticsTask {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn sweep(&self) -> Result<usize, PipelineError> {
        self.sweep_at(Utc::now()).await
    }
}
