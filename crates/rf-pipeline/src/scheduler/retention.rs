use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rf_core::{ArtifactStore, MessageRecord, MetadataStore};
use std::collections::HashSet;
use std::sync::Arc;

use super::SweepTask;
use crate::error::PipelineError;

/// Poda mensajes de batches sellados con más de `max_age` desde su
/// recepción, salvo en suites con retención indefinida. Borra primero los
/// artifacts y después el cuerpo; el registro queda como tombstone.
pub struct RetentionTask {
    metadata: Arc<dyn MetadataStore>,
    artifacts: Arc<dyn ArtifactStore>,
    max_age: Duration,
}

impl RetentionTask {
    pub fn new(metadata: Arc<dyn MetadataStore>, artifacts: Arc<dyn ArtifactStore>, max_age: Duration) -> Self {
        Self { metadata,
               artifacts,
               max_age }
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let cutoff = now - self.max_age;
        let prunable_suites: HashSet<_> = self.metadata
                                              .list_suites()
                                              .await?
                                              .into_iter()
                                              .filter(|s| !s.retain_indefinitely)
                                              .map(|s| s.id)
                                              .collect();
        let mut pruned = 0;
        for batch in self.metadata.list_batches().await? {
            if !batch.is_sealed() || !prunable_suites.contains(&batch.suite_id) {
                continue;
            }
            for message in self.metadata.list_messages(batch.id).await? {
                if message.is_pruned() || message.received_at > cutoff {
                    continue;
                }
                if self.prune(&message, now).await? {
                    pruned += 1;
                }
            }
        }
        Ok(pruned)
    }

    async fn prune(&self, message: &MessageRecord, now: DateTime<Utc>) -> Result<bool, PipelineError> {
        for artifact in &message.artifacts {
            let key = message.artifact_key(&artifact.key);
            match self.artifacts.delete(&key).await {
                Ok(_) => info!("retention: deleted artifact {key} of message {}", message.id),
                Err(e) => {
                    // El mensaje queda intacto y se reintenta en la próxima pasada.
                    warn!("retention: could not delete artifact {key}: {e}");
                    return Ok(false);
                }
            }
        }
        let pruned = self.metadata.prune_message(message.id, now).await?.is_some();
        if pruned {
            info!("retention: pruned body of message {} (received {})", message.id, message.received_at);
        }
        Ok(pruned)
    }
}

#[async_trait]
impl SweepTask for RetentionTask {
    fn name(&self) -> &'static str {
        "retention"
    }

    async fn sweep(&self) -> Result<usize, PipelineError> {
        self.sweep_at(Utc::now()).await
    }
}
