//! Consumer de comparaciones y lectura de resultados.
//!
//! Cada job pasa por `claim -> compute -> store -> outbox -> release`. El
//! claim en el `MetadataStore` hace que jobs concurrentes sobre el mismo par
//! produzcan un único resultado; el chequeo de vigencia en `store_comparison`
//! descarta resultados de candidatos reemplazados.
use chrono::Utc;
use log::{debug, error, info, warn};
use rf_core::{ClaimOutcome, ComparisonEngine, ComparisonKey, ComparisonRecord, ComparisonResult, ComparisonState,
              FailedJob, MessageRecord, MetadataStore, Outbox, PipelineEventKind, StoreComparisonOutcome, StoreError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};

use crate::error::PipelineError;
use crate::queue::ComparisonJob;
use crate::retry::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Stored,
    /// Ya había un resultado para esa versión del candidato.
    AlreadyComputed,
    /// Otro worker tiene el mismo par en curso.
    Coalesced,
    /// El candidato fue reemplazado o podado; no se persiste nada.
    Stale,
    PendingNoBaseline,
    /// Agotó los reintentos con un error distinto de baseline ausente.
    Parked,
}

pub struct ComparisonConsumer {
    metadata: Arc<dyn MetadataStore>,
    outbox: Arc<dyn Outbox>,
    engine: ComparisonEngine,
    retry: RetryPolicy,
    workers: usize,
}

impl ComparisonConsumer {
    pub fn new(metadata: Arc<dyn MetadataStore>,
               outbox: Arc<dyn Outbox>,
               engine: ComparisonEngine,
               retry: RetryPolicy,
               workers: usize)
               -> Self {
        Self { metadata,
               outbox,
               engine,
               retry,
               workers: workers.max(1) }
    }

    /// Procesa un job. Los fallos del medio se reintentan con backoff en cada
    /// etapa; agotado el presupuesto el job queda estacionado como `FailedJob`.
    /// `Err` sólo si ni siquiera pudo estacionarse.
    pub async fn process(&self, job: ComparisonJob) -> Result<JobOutcome, PipelineError> {
        let attempts = AtomicU32::new(0);
        let metadata = &self.metadata;
        let claim = retry_with_backoff(self.retry, "claim comparison", || {
                        attempts.fetch_add(1, Ordering::Relaxed);
                        async move {
                            metadata.claim_comparison(job.key, job.candidate_version)
                                    .await
                                    .map_err(PipelineError::from)
                        }
                    }).await;
        let claim = match claim {
            Ok(claim) => claim,
            Err(e) => return self.park(job, attempts.load(Ordering::Relaxed), e).await,
        };
        match claim {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyComputed => {
                debug!("comparison {} already computed for v{}", job.key, job.candidate_version);
                return Ok(JobOutcome::AlreadyComputed);
            }
            ClaimOutcome::InFlight => {
                debug!("comparison {} coalesced with in-flight job", job.key);
                return Ok(JobOutcome::Coalesced);
            }
        }
        let outcome = self.process_claimed(job).await;
        if let Err(e) = self.metadata.release_claim(job.key).await {
            warn!("could not release claim on {}: {e}", job.key);
        }
        outcome
    }

    async fn process_claimed(&self, job: ComparisonJob) -> Result<JobOutcome, PipelineError> {
        let attempts = AtomicU32::new(0);
        let computed = retry_with_backoff(self.retry, "compare", || {
                           attempts.fetch_add(1, Ordering::Relaxed);
                           self.compute(job)
                       }).await;

        let (candidate, result) = match computed {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!("comparison {} discarded: candidate no longer current", job.key);
                return Ok(JobOutcome::Stale);
            }
            Err(PipelineError::ComparisonInputMissing(reason)) => {
                warn!("comparison {} pending without baseline: {reason}", job.key);
                let record = ComparisonRecord { key: job.key,
                                                candidate_version: job.candidate_version,
                                                state: ComparisonState::PendingNoBaseline,
                                                reported: false,
                                                updated_at: Utc::now() };
                return Ok(match self.store(job, record).await? {
                              Some(StoreComparisonOutcome::Stored) => JobOutcome::PendingNoBaseline,
                              Some(StoreComparisonOutcome::Stale) => JobOutcome::Stale,
                              None => JobOutcome::Parked,
                          });
            }
            Err(e) => return self.park(job, attempts.load(Ordering::Relaxed), e).await,
        };

        let event = ready_event(&candidate, job.key, &result);
        let similarity = result.overview.similarity;
        let record = ComparisonRecord::ready(job.key, job.candidate_version, result, Utc::now());
        match self.store(job, record).await? {
            None => Ok(JobOutcome::Parked),
            Some(StoreComparisonOutcome::Stale) => {
                debug!("comparison {} discarded: candidate replaced while computing", job.key);
                Ok(JobOutcome::Stale)
            }
            Some(StoreComparisonOutcome::Stored) => {
                info!("comparison {} stored (similarity={similarity:.4})", job.key);
                let outbox = &self.outbox;
                let event = &event;
                let appended = retry_with_backoff(self.retry, "append comparison-ready", || async move {
                                   outbox.append_kind(event.clone()).await.map_err(PipelineError::from)
                               }).await;
                if let Err(e) = appended {
                    // El resultado ya es Ready sin reportar: reporting lo recupera.
                    warn!("comparison {}: comparison-ready event deferred: {e}", job.key);
                }
                Ok(JobOutcome::Stored)
            }
        }
    }

    // `None`: se agotaron los reintentos y el job quedó estacionado.
    async fn store(&self,
                   job: ComparisonJob,
                   record: ComparisonRecord)
                   -> Result<Option<StoreComparisonOutcome>, PipelineError> {
        let attempts = AtomicU32::new(0);
        let metadata = &self.metadata;
        let record = &record;
        let stored = retry_with_backoff(self.retry, "store comparison", || {
                         attempts.fetch_add(1, Ordering::Relaxed);
                         async move { metadata.store_comparison(record.clone()).await.map_err(PipelineError::from) }
                     }).await;
        match stored {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                self.park(job, attempts.load(Ordering::Relaxed), e).await?;
                Ok(None)
            }
        }
    }

    async fn park(&self, job: ComparisonJob, attempts: u32, err: PipelineError) -> Result<JobOutcome, PipelineError> {
        let failed = FailedJob { key: job.key,
                                 candidate_version: job.candidate_version,
                                 attempts,
                                 last_error: err.to_string(),
                                 parked_at: Utc::now() };
        error!("comparison {} parked after {} attempts: {}", failed.key, failed.attempts, failed.last_error);
        let metadata = &self.metadata;
        let failed = &failed;
        retry_with_backoff(self.retry, "park failed job", || async move {
            metadata.park_failed_job(failed.clone()).await.map_err(PipelineError::from)
        }).await?;
        Ok(JobOutcome::Parked)
    }

    // Ok(None): el candidato ya no es el vigente en esa versión.
    async fn compute(&self, job: ComparisonJob) -> Result<Option<(MessageRecord, ComparisonResult)>, PipelineError> {
        let Some(candidate) = self.metadata.get_message(job.key.candidate).await? else {
            return Ok(None);
        };
        if candidate.version != job.candidate_version {
            return Ok(None);
        }
        let Some(candidate_body) = candidate.body.clone() else {
            return Ok(None);
        };
        let baseline_body = match self.metadata.get_message(job.key.baseline).await? {
            Some(MessageRecord { body: Some(body), .. }) => body,
            Some(_) => return Err(PipelineError::ComparisonInputMissing(format!("baseline {} pruned", job.key.baseline))),
            None => return Err(PipelineError::ComparisonInputMissing(format!("baseline {} not found", job.key.baseline))),
        };

        let engine = self.engine;
        let result = tokio::task::spawn_blocking(move || engine.compare(&candidate_body, &baseline_body))
            .await
            .map_err(|e| PipelineError::Store(StoreError::Internal(format!("comparison task: {e}"))))?;
        Ok(Some((candidate, result)))
    }

    /// Consume la cola con hasta `workers` jobs en paralelo. Al recibir
    /// shutdown deja de tomar jobs y espera a los que están en curso.
    pub async fn run(self: Arc<Self>,
                     mut rx: mpsc::UnboundedReceiver<ComparisonJob>,
                     mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.workers));
        loop {
            let job = tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let consumer = Arc::clone(&self);
            tokio::spawn(async move {
                match consumer.process(job).await {
                    Ok(outcome) => debug!("comparison job {} -> {outcome:?}", job.key),
                    Err(e) => error!("comparison job {} failed: {e}", job.key),
                }
                drop(permit);
            });
        }
        // Espera a que terminen los jobs en curso.
        let _ = permits.acquire_many(self.workers as u32).await;
        debug!("comparison consumer stopped");
    }
}

/// Evento `comparison-ready` de un resultado persistido.
pub(crate) fn ready_event(candidate: &MessageRecord, key: ComparisonKey, result: &ComparisonResult) -> PipelineEventKind {
    PipelineEventKind::ComparisonReady { candidate: key.candidate,
                                         baseline: key.baseline,
                                         suite_id: candidate.suite_id,
                                         batch_id: candidate.batch_id,
                                         element_id: candidate.element_id,
                                         similarity: result.overview.similarity,
                                         fingerprint: result.fingerprint() }
}

/// Vista de una comparación para consumidores externos.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonLookup {
    Ready(ComparisonResult),
    Pending,
    PendingNoBaseline,
    Failed { reason: String },
    NotFound,
}

pub struct ComparisonReader {
    metadata: Arc<dyn MetadataStore>,
}

impl ComparisonReader {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Nunca calcula de forma síncrona: sólo informa el estado persistido.
    pub async fn get_comparison(&self,
                                candidate: uuid::Uuid,
                                baseline: uuid::Uuid)
                                -> Result<ComparisonLookup, PipelineError> {
        let record = self.metadata.get_comparison(ComparisonKey::new(candidate, baseline)).await?;
        Ok(match record.map(|r| r.state) {
            None => ComparisonLookup::NotFound,
            Some(ComparisonState::Ready(result)) => ComparisonLookup::Ready(result),
            Some(ComparisonState::Pending) => ComparisonLookup::Pending,
            Some(ComparisonState::PendingNoBaseline) => ComparisonLookup::PendingNoBaseline,
            Some(ComparisonState::Failed { reason }) => ComparisonLookup::Failed { reason },
        })
    }
}
