use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use rf_core::MetadataStore;
use std::sync::Arc;

use super::SweepTask;
use crate::error::PipelineError;
use crate::lifecycle::BatchLifecycle;

/// Sella batches abiertos sin envíos durante `inactivity`. Un batch sin
/// mensajes nunca se sella automáticamente. Cada pasada también emite los
/// eventos de ciclo de vida que quedaron pendientes.
pub struct AutoSealTask {
    metadata: Arc<dyn MetadataStore>,
    lifecycle: Arc<BatchLifecycle>,
    inactivity: Duration,
}

impl AutoSealTask {
    pub fn new(metadata: Arc<dyn MetadataStore>, lifecycle: Arc<BatchLifecycle>, inactivity: Duration) -> Self {
        Self { metadata,
               lifecycle,
               inactivity }
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let mut sealed = 0;
        for batch in self.metadata.list_batches().await? {
            if batch.is_sealed() {
                continue;
            }
            let Some(last) = batch.last_submission_at else {
                continue;
            };
            if now - last < self.inactivity {
                continue;
            }
            debug!("batch {} idle since {last}", batch.slug);
            if self.lifecycle.seal(batch.id).await?.is_some() {
                sealed += 1;
            }
        }
        let recovered = self.lifecycle.announce_pending().await?;
        if recovered > 0 {
            debug!("autoseal: {recovered} lifecycle events recovered");
        }
        Ok(sealed)
    }
}

#[async_trait]
impl SweepTask for AutoSealTask {
    fn name(&self) -> &'static str {
        "autoseal"
    }

    async fn sweep(&self) -> Result<usize, PipelineError> {
        self.sweep_at(Utc::now()).await
    }
}
