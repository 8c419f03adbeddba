//! Ciclo de vida de batches: sellado, promoción de baseline y reconciliación
//! de comparaciones.
use chrono::Utc;
use log::{debug, info, warn};
use rf_core::{Batch, ComparisonKey, ComparisonState, MetadataStore, Outbox, PipelineEventKind, PromotionRecord,
              SealOutcome};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::queue::{ComparisonJob, ComparisonQueue};

pub struct BatchLifecycle {
    metadata: Arc<dyn MetadataStore>,
    outbox: Arc<dyn Outbox>,
    comparisons: ComparisonQueue,
}

impl BatchLifecycle {
    pub fn new(metadata: Arc<dyn MetadataStore>, outbox: Arc<dyn Outbox>, comparisons: ComparisonQueue) -> Self {
        Self { metadata,
               outbox,
               comparisons }
    }

    /// Sella el batch. Devuelve el batch sólo si esta llamada hizo la
    /// transición. `BatchSealed` se emite exactamente una vez por batch: si el
    /// outbox falla, el evento queda pendiente y lo emite un `seal` posterior o
    /// `announce_pending`.
    pub async fn seal(&self, batch_id: Uuid) -> Result<Option<Batch>, PipelineError> {
        match self.metadata.seal_batch(batch_id, Utc::now()).await? {
            SealOutcome::AlreadySealed => {
                debug!("batch {batch_id} already sealed");
                if let Some(batch) = self.metadata.get_batch(batch_id).await? {
                    if let Err(e) = self.announce_sealed(&batch).await {
                        warn!("batch {batch_id}: batch-sealed event still pending: {e}");
                    }
                }
                Ok(None)
            }
            SealOutcome::Sealed(batch) => {
                info!("batch {} ({}) sealed", batch.slug, batch.id);
                if let Err(e) = self.announce_sealed(&batch).await {
                    warn!("batch {}: batch-sealed event deferred: {e}", batch.id);
                }
                Ok(Some(batch))
            }
        }
    }

    /// Promueve `batch_id` a baseline de la suite y encola las comparaciones
    /// de los demás batches contra el nuevo baseline. `None` si ya lo era.
    pub async fn promote(&self,
                         suite_id: Uuid,
                         batch_id: Uuid,
                         by: &str,
                         reason: &str)
                         -> Result<Option<PromotionRecord>, PipelineError> {
        let Some(record) = self.metadata.promote_baseline(suite_id, batch_id, by, reason, Utc::now()).await? else {
            debug!("batch {batch_id} already baseline of suite {suite_id}");
            return Ok(None);
        };
        info!("suite {suite_id}: baseline {:?} -> {} by {by}", record.from, record.to);
        let enqueued = self.reconcile_suite(suite_id).await?;
        debug!("suite {suite_id}: {enqueued} comparisons enqueued after promotion");
        if let Err(e) = self.announce_promotion(&record).await {
            warn!("suite {suite_id}: baseline-promoted event deferred: {e}");
        }
        Ok(Some(record))
    }

    /// Emite los eventos de sellado y promoción que quedaron sin emitir.
    /// Devuelve cuántos agregó al outbox.
    pub async fn announce_pending(&self) -> Result<usize, PipelineError> {
        let mut emitted = 0;
        for batch in self.metadata.list_batches().await?.iter().filter(|b| b.is_sealed()) {
            if self.announce_sealed(batch).await? {
                emitted += 1;
            }
        }
        for suite in self.metadata.list_suites().await? {
            for record in self.metadata.list_promotions(suite.id).await? {
                if self.announce_promotion(&record).await? {
                    emitted += 1;
                }
            }
        }
        if emitted > 0 {
            info!("emitted {emitted} pending lifecycle events");
        }
        Ok(emitted)
    }

    async fn announce_sealed(&self, batch: &Batch) -> Result<bool, PipelineError> {
        let kind = PipelineEventKind::BatchSealed { batch_id: batch.id,
                                                    suite_id: batch.suite_id,
                                                    sealed_at: batch.sealed_at.unwrap_or_else(Utc::now) };
        self.announce(&batch.seal_announcement_key(), kind).await
    }

    async fn announce_promotion(&self, record: &PromotionRecord) -> Result<bool, PipelineError> {
        let kind = PipelineEventKind::BaselinePromoted { suite_id: record.suite_id,
                                                         from: record.from,
                                                         to: record.to,
                                                         by: record.by.clone(),
                                                         reason: record.reason.clone() };
        self.announce(&record.announcement_key(), kind).await
    }

    // La reserva en el MetadataStore decide quién emite; si el append falla
    // se libera para que otro intento la tome.
    async fn announce(&self, key: &str, kind: PipelineEventKind) -> Result<bool, PipelineError> {
        if !self.metadata.claim_announcement(key).await? {
            return Ok(false);
        }
        match self.outbox.append_kind(kind).await {
            Ok(_) => Ok(true),
            Err(e) => {
                if let Err(release) = self.metadata.release_announcement(key).await {
                    warn!("could not release announcement {key}: {release}");
                }
                Err(e.into())
            }
        }
    }

    /// Encola un job por cada mensaje vigente de la suite que tiene
    /// contraparte en el baseline y todavía no tiene resultado para su versión.
    /// Los jobs estacionados no se reintentan.
    pub async fn reconcile_suite(&self, suite_id: Uuid) -> Result<usize, PipelineError> {
        let Some(suite) = self.metadata.get_suite(suite_id).await? else {
            return Err(PipelineError::Resolution(format!("suite {suite_id}")));
        };
        let Some(baseline_batch) = suite.baseline_batch else {
            return Ok(0);
        };
        let batches = self.metadata.list_batches().await?;
        let mut enqueued = 0;
        for batch in batches.iter().filter(|b| b.suite_id == suite_id && b.id != baseline_batch) {
            for candidate in self.metadata.list_messages(batch.id).await? {
                if candidate.is_pruned() {
                    continue;
                }
                let Some(baseline) = self.metadata.current_message(baseline_batch, candidate.element_id).await? else {
                    continue;
                };
                let key = ComparisonKey::new(candidate.id, baseline.id);
                let existing = self.metadata.get_comparison(key).await?;
                let skip = match existing {
                    Some(r) if r.candidate_version == candidate.version => {
                        matches!(r.state, ComparisonState::Ready(_) | ComparisonState::Failed { .. })
                    }
                    _ => false,
                };
                if skip {
                    continue;
                }
                self.metadata.register_comparison(key, candidate.version, Utc::now()).await?;
                self.comparisons.enqueue(ComparisonJob { key,
                                                         candidate_version: candidate.version })?;
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            info!("suite {}: reconciled {enqueued} comparisons", suite.slug);
        }
        Ok(enqueued)
    }

    /// Reconciliación completa, usada al arrancar para recuperar jobs que se
    /// perdieron con la cola en memoria.
    pub async fn reconcile_all(&self) -> Result<usize, PipelineError> {
        let mut total = 0;
        for suite in self.metadata.list_suites().await? {
            total += self.reconcile_suite(suite.id).await?;
        }
        Ok(total)
    }
}
