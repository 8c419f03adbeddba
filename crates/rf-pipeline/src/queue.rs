//! Colas in-process del pipeline.
//!
//! Las colas sólo transportan identidades; el estado vive en el
//! `MetadataStore`, de modo que un job perdido se recupera con
//! `BatchLifecycle::reconcile_suite`.
use rf_core::ComparisonKey;
use tokio::sync::{mpsc, oneshot};

use crate::error::PipelineError;
use crate::ingestion::SubmissionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComparisonJob {
    pub key: ComparisonKey,
    pub candidate_version: u64,
}

#[derive(Clone)]
pub struct ComparisonQueue {
    tx: mpsc::UnboundedSender<ComparisonJob>,
}

impl ComparisonQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ComparisonJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: ComparisonJob) -> Result<(), PipelineError> {
        self.tx
            .send(job)
            .map_err(|e| PipelineError::QueueClosed(format!("comparison job {}", e.0.key)))
    }
}

/// Mensaje binario pendiente de ingesta, con canal de respuesta opcional.
pub struct Submission {
    pub bytes: Vec<u8>,
    pub reply: Option<oneshot::Sender<Result<SubmissionOutcome, PipelineError>>>,
}

#[derive(Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<Submission>,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Submission>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Encola y espera el veredicto síncrono (aceptado/rechazado/decode).
    pub async fn submit(&self, bytes: Vec<u8>) -> Result<SubmissionOutcome, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Submission { bytes,
                               reply: Some(reply) })
            .await
            .map_err(|_| PipelineError::QueueClosed("ingestion".into()))?;
        rx.await.map_err(|_| PipelineError::QueueClosed("ingestion reply".into()))?
    }
}
