use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{PipelineEvent, PipelineEventKind};
use crate::errors::StoreError;

/// Outbox durable append-only de eventos salientes.
///
/// Un evento queda pendiente hasta que se lo confirma con `acknowledge`; la
/// entrega es al-menos-una-vez y el consumidor deduplica cuando corresponde.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con seq y ts).
    async fn append_kind(&self, kind: PipelineEventKind) -> Result<PipelineEvent, StoreError>;
    /// Eventos no confirmados, en orden ascendente de seq.
    async fn list_pending(&self) -> Result<Vec<PipelineEvent>, StoreError>;
    /// Marca el evento como entregado. `false` si ya lo estaba o no existe.
    async fn acknowledge(&self, seq: u64) -> Result<bool, StoreError>;
    /// Todos los eventos (pendientes y confirmados), para inspección.
    async fn list_all(&self) -> Result<Vec<PipelineEvent>, StoreError>;
}

#[derive(Default)]
struct OutboxState {
    next_seq: u64,
    events: BTreeMap<u64, (PipelineEvent, bool)>,
}

#[derive(Default)]
pub struct InMemoryOutbox {
    inner: Mutex<OutboxState>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, OutboxState>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Internal("outbox lock poisoned".into()))
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn append_kind(&self, kind: PipelineEventKind) -> Result<PipelineEvent, StoreError> {
        let mut state = self.lock()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        let ev = PipelineEvent { seq, kind, ts: Utc::now() };
        state.events.insert(seq, (ev.clone(), false));
        Ok(ev)
    }

    async fn list_pending(&self) -> Result<Vec<PipelineEvent>, StoreError> {
        let state = self.lock()?;
        Ok(state.events.values().filter(|(_, acked)| !acked).map(|(ev, _)| ev.clone()).collect())
    }

    async fn acknowledge(&self, seq: u64) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.events.get_mut(&seq) {
            Some((_, acked)) if !*acked => {
                *acked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_all(&self) -> Result<Vec<PipelineEvent>, StoreError> {
        let state = self.lock()?;
        Ok(state.events.values().map(|(ev, _)| ev.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sealed() -> PipelineEventKind {
        PipelineEventKind::BatchSealed { batch_id: Uuid::new_v4(),
                                         suite_id: Uuid::new_v4(),
                                         sealed_at: Utc::now() }
    }

    #[tokio::test]
    async fn seq_is_monotonic_and_ack_is_once() {
        let outbox = InMemoryOutbox::new();
        let a = outbox.append_kind(sealed()).await.unwrap();
        let b = outbox.append_kind(sealed()).await.unwrap();
        assert_eq!((a.seq, b.seq), (0, 1));

        assert!(outbox.acknowledge(a.seq).await.unwrap());
        assert!(!outbox.acknowledge(a.seq).await.unwrap());
        assert!(!outbox.acknowledge(99).await.unwrap());

        let pending = outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, 1);
        assert_eq!(outbox.list_all().await.unwrap().len(), 2);
    }
}
