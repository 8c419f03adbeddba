use async_trait::async_trait;
use log::{debug, warn};
use rf_core::{ComparisonKey, MetadataStore, Outbox, PipelineEvent, PipelineEventKind};
use std::collections::HashSet;
use std::sync::Arc;

use super::SweepTask;
use crate::comparison::ready_event;
use crate::error::PipelineError;
use crate::notifier::Notifier;

/// Entrega los eventos pendientes del outbox. Un evento sólo se confirma
/// después de entregarlo; una comparación ya reportada no se vuelve a
/// notificar. Antes de entregar, recupera las comparaciones `Ready` sin
/// reportar cuyo evento nunca llegó al outbox.
pub struct ReportingTask {
    metadata: Arc<dyn MetadataStore>,
    outbox: Arc<dyn Outbox>,
    notifier: Arc<dyn Notifier>,
}

impl ReportingTask {
    pub fn new(metadata: Arc<dyn MetadataStore>, outbox: Arc<dyn Outbox>, notifier: Arc<dyn Notifier>) -> Self {
        Self { metadata,
               outbox,
               notifier }
    }

    /// Agrega un `comparison-ready` por cada resultado listo, sin reportar y
    /// sin evento pendiente. Devuelve cuántos agregó.
    pub async fn recover_unannounced(&self) -> Result<usize, PipelineError> {
        let pending: HashSet<ComparisonKey> =
            self.outbox
                .list_pending()
                .await?
                .into_iter()
                .filter_map(|ev| match ev.kind {
                    PipelineEventKind::ComparisonReady { candidate, baseline, .. } => {
                        Some(ComparisonKey::new(candidate, baseline))
                    }
                    _ => None,
                })
                .collect();
        let mut recovered = 0;
        for record in self.metadata.list_comparisons().await? {
            if record.reported || pending.contains(&record.key) {
                continue;
            }
            let Some(result) = record.result() else {
                continue;
            };
            let Some(candidate) = self.metadata.get_message(record.key.candidate).await? else {
                continue;
            };
            self.outbox.append_kind(ready_event(&candidate, record.key, result)).await?;
            debug!("comparison {} had no pending event; re-emitted", record.key);
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn report(&self, event: &PipelineEvent) -> Result<bool, PipelineError> {
        match &event.kind {
            PipelineEventKind::ComparisonReady { candidate, baseline, .. } => {
                let key = ComparisonKey::new(*candidate, *baseline);
                let record = self.metadata.get_comparison(key).await?;
                match record {
                    Some(r) if r.result().is_some() && !r.reported => {
                        self.notifier.deliver(event).await?;
                        self.metadata.mark_reported(key).await?;
                        Ok(true)
                    }
                    Some(r) if r.reported => {
                        debug!("comparison {key} already reported");
                        Ok(false)
                    }
                    _ => {
                        debug!("comparison {key} no longer available, dropping event #{}", event.seq);
                        Ok(false)
                    }
                }
            }
            PipelineEventKind::BatchSealed { .. }
            | PipelineEventKind::BaselinePromoted { .. }
            | PipelineEventKind::UsageReport { .. } => {
                self.notifier.deliver(event).await?;
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl SweepTask for ReportingTask {
    fn name(&self) -> &'static str {
        "reporting"
    }

    async fn sweep(&self) -> Result<usize, PipelineError> {
        if let Err(e) = self.recover_unannounced().await {
            warn!("reporting: could not scan unreported comparisons: {e}");
        }
        let mut delivered = 0;
        for event in self.outbox.list_pending().await? {
            match self.report(&event).await {
                Ok(sent) => {
                    self.outbox.acknowledge(event.seq).await?;
                    if sent {
                        delivered += 1;
                    }
                }
                Err(e) => warn!("event #{} ({}) not delivered: {e}", event.seq, event.kind.type_name()),
            }
        }
        Ok(delivered)
    }
}
