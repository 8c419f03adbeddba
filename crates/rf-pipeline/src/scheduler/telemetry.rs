use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rf_core::{MetadataStore, Outbox, PipelineEventKind};
use std::sync::{Arc, Mutex};

use super::{all_messages, SweepTask};
use crate::error::PipelineError;

/// Reporte de uso: mensajes recibidos, comparaciones listas y batches
/// sellados desde la pasada anterior. Con telemetría deshabilitada no emite
/// nada.
pub struct TelemetryTask {
    metadata: Arc<dyn MetadataStore>,
    outbox: Arc<dyn Outbox>,
    enabled: bool,
    since: Mutex<DateTime<Utc>>,
}

impl TelemetryTask {
    pub fn new(metadata: Arc<dyn MetadataStore>, outbox: Arc<dyn Outbox>, enabled: bool, since: DateTime<Utc>) -> Self {
        Self { metadata,
               outbox,
               enabled,
               since: Mutex::new(since) }
    }

    fn period_start(&self) -> Result<DateTime<Utc>, PipelineError> {
        self.since
            .lock()
            .map(|s| *s)
            .map_err(|_| PipelineError::Store(rf_core::StoreError::Internal("telemetry mutex poisoned".into())))
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        if !self.enabled {
            debug!("telemetry disabled");
            return Ok(0);
        }
        let start = self.period_start()?;
        let within = |t: DateTime<Utc>| t > start && t <= now;

        let messages = all_messages(self.metadata.as_ref()).await?
                                                            .iter()
                                                            .filter(|m| within(m.received_at))
                                                            .count();
        let comparisons = self.metadata
                              .list_comparisons()
                              .await?
                              .iter()
                              .filter(|r| r.result().is_some() && within(r.updated_at))
                              .count();
        let sealed_batches = self.metadata
                                 .list_batches()
                                 .await?
                                 .iter()
                                 .filter(|b| b.sealed_at.map(within).unwrap_or(false))
                                 .count();

        self.outbox
            .append_kind(PipelineEventKind::UsageReport { period_start: start,
                                                          period_end: now,
                                                          messages,
                                                          comparisons,
                                                          sealed_batches })
            .await?;
        if let Ok(mut since) = self.since.lock() {
            *since = now;
        }
        Ok(1)
    }
}

#[async_trait]
impl SweepTask for TelemetryTask {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn sweep(&self) -> Result<usize, PipelineError> {
        self.sweep_at(Utc::now()).await
    }
}
