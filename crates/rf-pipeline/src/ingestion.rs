//! Consumer de ingesta: `Received -> Decoded -> Persisted -> ComparisonEnqueued`,
//! con `Rejected(reason)` terminal desde `Received` o `Decoded`.
//!
//! Orden de efectos:
//! 1. decode (nada se persiste si falla)
//! 2. resolución de team/suite/batch/element
//! 3. pre-chequeo de batch sellado / duplicado (rechazo rápido sin escribir)
//! 4. artifacts en `{messageId}/{artifactKey}` (opcionalmente releídos y
//!    verificados contra su SHA-256)
//! 5. `put_message`, que repite los chequeos de forma atómica; si pierde la
//!    carrera contra un seal o un duplicado, los artifacts ya escritos se borran
//! 6. a lo sumo un job de comparación contra el baseline vigente; si el
//!    mensaje reemplazó a uno del batch baseline, los candidatos de ese
//!    elemento se re-encolan contra el nuevo
use chrono::Utc;
use log::{debug, info, warn};
use rf_core::model::artifact_storage_key;
use rf_core::{decode, ArtifactRef, ArtifactStore, ComparisonKey, DecodeError, DecodedMessage, Destination, MessageRecord,
              MetadataStore, NewMessage, PutMessageOutcome, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::queue::{ComparisonJob, ComparisonQueue, Submission};
use crate::retry::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    UnknownDestination,
    BatchSealed,
    DuplicateMessage,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::UnknownDestination => "unknown destination",
            RejectReason::BatchSealed => "batch sealed",
            RejectReason::DuplicateMessage => "duplicate message",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionState {
    Received,
    Decoded,
    Persisted,
    ComparisonEnqueued,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted { message_id: Uuid, comparison_enqueued: bool },
    Rejected(RejectReason),
    DecodeError(DecodeError),
}

pub struct IngestionConsumer {
    metadata: Arc<dyn MetadataStore>,
    artifacts: Arc<dyn ArtifactStore>,
    comparisons: ComparisonQueue,
    allow_overwrite: bool,
    retry: RetryPolicy,
    verify_artifacts: bool,
}

// Traza de transiciones de un envío.
struct Trace {
    id: Uuid,
    state: IngestionState,
}

impl Trace {
    fn new() -> Self {
        let t = Self { id: Uuid::new_v4(),
                       state: IngestionState::Received };
        debug!("ingestion {}: {:?}", t.id, t.state);
        t
    }

    fn advance(&mut self, next: IngestionState) {
        debug!("ingestion {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    fn reject(&mut self, reason: RejectReason, detail: &str) -> SubmissionOutcome {
        warn!("ingestion {} rejected ({reason}): {detail}", self.id);
        self.advance(IngestionState::Rejected(reason));
        SubmissionOutcome::Rejected(reason)
    }
}

impl IngestionConsumer {
    pub fn new(metadata: Arc<dyn MetadataStore>,
               artifacts: Arc<dyn ArtifactStore>,
               comparisons: ComparisonQueue,
               allow_overwrite: bool,
               retry: RetryPolicy)
               -> Self {
        Self { metadata,
               artifacts,
               comparisons,
               allow_overwrite,
               retry,
               verify_artifacts: false }
    }

    /// Relee cada artifact recién escrito y verifica largo y SHA-256 antes
    /// de registrar el mensaje.
    pub fn with_artifact_verification(mut self, verify: bool) -> Self {
        self.verify_artifacts = verify;
        self
    }

    /// Procesa un mensaje binario. `Err` sólo para fallos del medio que
    /// agotaron los reintentos; los errores estructurales son `Ok(Rejected)` o
    /// `Ok(DecodeError)`.
    pub async fn submit(&self, bytes: &[u8]) -> Result<SubmissionOutcome, PipelineError> {
        let mut trace = Trace::new();
        let message = match decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!("ingestion {} decode error: {e}", trace.id);
                return Ok(SubmissionOutcome::DecodeError(e));
            }
        };
        trace.advance(IngestionState::Decoded);

        let meta = &message.metadata;
        let metadata = &self.metadata;
        let dest = retry_with_backoff(self.retry, "resolve destination", || async move {
                       metadata.resolve(&meta.team, &meta.suite, &meta.batch, &meta.element)
                                   .await
                                   .map_err(PipelineError::from)
                   }).await?;
        let Some(dest) = dest else {
            let detail = format!("{}/{}/{}/{}", meta.team, meta.suite, meta.batch, meta.element);
            return Ok(trace.reject(RejectReason::UnknownDestination, &detail));
        };

        if dest.batch.is_sealed() {
            return Ok(trace.reject(RejectReason::BatchSealed, &dest.batch.slug));
        }
        if !self.allow_overwrite {
            let (batch_id, element_id) = (dest.batch.id, dest.element.id);
            let existing = retry_with_backoff(self.retry, "current message", || async move {
                               metadata.current_message(batch_id, element_id).await.map_err(PipelineError::from)
                           }).await?;
            if existing.is_some() {
                return Ok(trace.reject(RejectReason::DuplicateMessage, &dest.element.slug));
            }
        }

        let message_id = Uuid::new_v4();
        let stored_keys = self.store_artifacts(message_id, &message).await?;
        let refs = message.artifact_refs();
        if self.verify_artifacts {
            if let Err(e) = self.verify_stored(message_id, &refs).await {
                self.delete_artifacts(&stored_keys).await;
                return Err(e);
            }
        }

        let new = NewMessage { id: message_id,
                               team_id: dest.team.id,
                               suite_id: dest.suite.id,
                               batch_id: dest.batch.id,
                               element_id: dest.element.id,
                               body: message.without_artifact_content(),
                               artifacts: refs,
                               received_at: Utc::now() };
        let outcome = match self.put_message(new).await {
            Ok(o) => o,
            Err(e) => {
                self.delete_artifacts(&stored_keys).await;
                return Err(e);
            }
        };
        let mut replaced = false;
        let record = match outcome {
            PutMessageOutcome::Inserted(record) => record,
            PutMessageOutcome::Replaced { record, previous } => {
                self.discard_replaced(&previous).await;
                replaced = true;
                record
            }
            PutMessageOutcome::BatchSealed => {
                self.delete_artifacts(&stored_keys).await;
                return Ok(trace.reject(RejectReason::BatchSealed, "sealed while ingesting"));
            }
            PutMessageOutcome::Duplicate { existing } if existing == message_id => {
                // Un reintento de put_message ya había confirmado este mismo mensaje.
                self.metadata
                    .get_message(message_id)
                    .await?
                    .ok_or_else(|| StoreError::Internal(format!("message {message_id} vanished")))?
            }
            PutMessageOutcome::Duplicate { existing } => {
                self.delete_artifacts(&stored_keys).await;
                return Ok(trace.reject(RejectReason::DuplicateMessage, &format!("existing {existing}")));
            }
        };
        trace.advance(IngestionState::Persisted);
        info!("accepted message {} ({}/{}/{}) version={} keys={} artifacts={}",
              record.id,
              dest.suite.slug,
              dest.batch.slug,
              dest.element.slug,
              record.version,
              record.overview.keys_count,
              record.artifacts.len());

        let comparison_enqueued = self.enqueue_comparison(&dest, &record).await?;
        if replaced {
            self.requeue_candidates(&record).await?;
        }
        if comparison_enqueued {
            trace.advance(IngestionState::ComparisonEnqueued);
        }
        Ok(SubmissionOutcome::Accepted { message_id: record.id,
                                         comparison_enqueued })
    }

    /// Drena la cola de ingesta hasta que se cierre o llegue shutdown. El
    /// envío en curso siempre termina.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<Submission>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let submission = tokio::select! {
                s = rx.recv() => match s {
                    Some(s) => s,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };
            let Submission { bytes, reply } = submission;
            let result = self.submit(&bytes).await;
            if let Err(e) = &result {
                warn!("ingestion failed: {e}");
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }
        debug!("ingestion consumer stopped");
    }

    async fn store_artifacts(&self, message_id: Uuid, message: &DecodedMessage) -> Result<Vec<String>, PipelineError> {
        let mut stored = Vec::with_capacity(message.artifacts.len());
        for artifact in &message.artifacts {
            let key = artifact_storage_key(message_id, &artifact.key);
            let artifacts = &self.artifacts;
            let (k, content) = (key.as_str(), artifact.content.as_slice());
            let put = retry_with_backoff(self.retry, "put artifact", || async move {
                          artifacts.put(k, content).await.map_err(PipelineError::from)
                      }).await;
            if let Err(e) = put {
                self.delete_artifacts(&stored).await;
                return Err(e);
            }
            stored.push(key);
        }
        Ok(stored)
    }

    async fn verify_stored(&self, message_id: Uuid, refs: &[ArtifactRef]) -> Result<(), PipelineError> {
        for reference in refs {
            let key = artifact_storage_key(message_id, &reference.key);
            let artifacts = &self.artifacts;
            let k = key.as_str();
            let content = retry_with_backoff(self.retry, "read back artifact", || async move {
                              artifacts.get(k).await.map_err(PipelineError::from)
                          }).await?;
            if !reference.verify(&content) {
                warn!("artifact {key} failed digest check ({} bytes read)", content.len());
                return Err(PipelineError::Store(StoreError::Internal(format!("artifact {key} failed digest check"))));
            }
        }
        Ok(())
    }

    async fn put_message(&self, new: NewMessage) -> Result<PutMessageOutcome, PipelineError> {
        let metadata = &self.metadata;
        let allow = self.allow_overwrite;
        let new = &new;
        retry_with_backoff(self.retry, "put message", || async move {
            metadata.put_message(new.clone(), allow).await.map_err(PipelineError::from)
        }).await
    }

    async fn delete_artifacts(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.artifacts.delete(key).await {
                warn!("could not delete orphan artifact {key}: {e}");
            }
        }
    }

    async fn discard_replaced(&self, previous: &MessageRecord) {
        for artifact in &previous.artifacts {
            let key = previous.artifact_key(&artifact.key);
            match self.artifacts.delete(&key).await {
                Ok(_) => info!("deleted artifact {key} of replaced message {}", previous.id),
                Err(e) => warn!("could not delete artifact {key} of replaced message {}: {e}", previous.id),
            }
        }
    }

    async fn enqueue_comparison(&self, dest: &Destination, record: &MessageRecord) -> Result<bool, PipelineError> {
        // La suite se relee: el baseline pudo cambiar desde la resolución.
        let Some(suite) = self.metadata.get_suite(dest.suite.id).await? else {
            return Ok(false);
        };
        let Some(baseline_batch) = suite.baseline_batch else {
            debug!("message {} stands alone: suite {} has no baseline", record.id, suite.slug);
            return Ok(false);
        };
        let Some(baseline) = self.metadata.current_message(baseline_batch, record.element_id).await? else {
            debug!("message {}: baseline batch lacks element {}", record.id, dest.element.slug);
            return Ok(false);
        };
        if baseline.id == record.id {
            return Ok(false);
        }
        let job = ComparisonJob { key: ComparisonKey::new(record.id, baseline.id),
                                  candidate_version: record.version };
        self.metadata.register_comparison(job.key, job.candidate_version, Utc::now()).await?;
        self.comparisons.enqueue(job)?;
        debug!("comparison enqueued {}", job.key);
        Ok(true)
    }

    /// Si `record` reemplazó un mensaje del batch baseline, las comparaciones
    /// de ese elemento apuntaban al mensaje borrado: se re-encolan contra el
    /// nuevo.
    async fn requeue_candidates(&self, record: &MessageRecord) -> Result<usize, PipelineError> {
        let Some(suite) = self.metadata.get_suite(record.suite_id).await? else {
            return Ok(0);
        };
        if suite.baseline_batch != Some(record.batch_id) {
            return Ok(0);
        }
        let mut enqueued = 0;
        for batch in self.metadata.list_batches().await?.iter() {
            if batch.suite_id != suite.id || batch.id == record.batch_id {
                continue;
            }
            let Some(candidate) = self.metadata.current_message(batch.id, record.element_id).await? else {
                continue;
            };
            if candidate.is_pruned() {
                continue;
            }
            let job = ComparisonJob { key: ComparisonKey::new(candidate.id, record.id),
                                      candidate_version: candidate.version };
            self.metadata.register_comparison(job.key, job.candidate_version, Utc::now()).await?;
            self.comparisons.enqueue(job)?;
            enqueued += 1;
        }
        if enqueued > 0 {
            info!("message {} replaced a baseline message; {enqueued} comparisons re-enqueued", record.id);
        }
        Ok(enqueued)
    }
}
