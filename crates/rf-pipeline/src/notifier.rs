//! Entrega de eventos del outbox al colaborador externo (mail/webhook).
use async_trait::async_trait;
use log::info;
use rf_core::PipelineEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::PipelineError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &PipelineEvent) -> Result<(), PipelineError>;
}

/// Escribe cada evento como JSON en el log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, event: &PipelineEvent) -> Result<(), PipelineError> {
        let payload = serde_json::to_string(&event.kind).map_err(|e| PipelineError::Notification(e.to_string()))?;
        info!("event #{} {}: {payload}", event.seq, event.kind.type_name());
        Ok(())
    }
}

/// Notifier en memoria; `set_failing(true)` simula un destino caído.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    delivered: Mutex<Vec<PipelineEvent>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<PipelineEvent> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn deliver(&self, event: &PipelineEvent) -> Result<(), PipelineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PipelineError::Notification(format!("destination down for #{}", event.seq)));
        }
        let mut delivered = self.delivered
                                .lock()
                                .map_err(|_| PipelineError::Notification("notifier mutex poisoned".into()))?;
        delivered.push(event.clone());
        Ok(())
    }
}
