#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rf_core::{encode, ArtifactStore, Batch, ClaimOutcome, ComparisonKey, ComparisonRecord, DecodedMessage, Destination,
              Element, FailedJob, InMemoryArtifactStore, InMemoryMetadataStore, InMemoryOutbox, MessageMetadata,
              MessageRecord, MetadataStore, NewMessage, Outbox, PipelineEvent, PipelineEventKind, PromotionRecord,
              PutMessageOutcome, ResultValue, SealOutcome, StoreComparisonOutcome, StoreError, Suite, Team};
use rf_pipeline::{BatchLifecycle, ComparisonConsumer, ComparisonJob, ComparisonQueue, IngestionConsumer, RetryPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4))
}

pub fn message(batch: &str, element: &str, results: &[(&str, ResultValue)]) -> DecodedMessage {
    let meta = MessageMetadata { team: "acme".into(),
                                 suite: "students".into(),
                                 batch: batch.into(),
                                 element: element.into(),
                                 built_at: batch.into(),
                                 submitted_at: Utc::now() };
    results.iter()
           .fold(DecodedMessage::new(meta), |m, (k, v)| m.with_result(k, v.clone()))
}

pub fn wire(m: &DecodedMessage) -> Vec<u8> {
    encode(m).unwrap()
}

pub struct Harness {
    pub metadata: Arc<InMemoryMetadataStore>,
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub outbox: Arc<InMemoryOutbox>,
    pub queue: ComparisonQueue,
    pub jobs: UnboundedReceiver<ComparisonJob>,
    pub team: Team,
    pub suite: Suite,
    pub v1: Batch,
    pub v2: Batch,
    pub alice: Element,
    pub bob: Element,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_retention(false).await
    }

    pub async fn with_retention(retain_indefinitely: bool) -> Self {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let team = metadata.create_team("acme").await.unwrap();
        let suite = metadata.create_suite(team.id, "students", retain_indefinitely).await.unwrap();
        let v1 = metadata.create_batch(suite.id, "v1", Utc::now()).await.unwrap();
        let v2 = metadata.create_batch(suite.id, "v2", Utc::now()).await.unwrap();
        let alice = metadata.create_element(suite.id, "alice").await.unwrap();
        let bob = metadata.create_element(suite.id, "bob").await.unwrap();
        let (queue, jobs) = ComparisonQueue::new();
        Self { metadata,
               artifacts: Arc::new(InMemoryArtifactStore::new()),
               outbox: Arc::new(InMemoryOutbox::new()),
               queue,
               jobs,
               team,
               suite,
               v1,
               v2,
               alice,
               bob }
    }

    pub fn ingestion(&self, allow_overwrite: bool) -> IngestionConsumer {
        IngestionConsumer::new(self.metadata.clone(),
                               self.artifacts.clone(),
                               self.queue.clone(),
                               allow_overwrite,
                               fast_retry())
    }

    pub fn comparisons(&self) -> Arc<ComparisonConsumer> {
        Arc::new(ComparisonConsumer::new(self.metadata.clone(),
                                         self.outbox.clone(),
                                         Default::default(),
                                         fast_retry(),
                                         4))
    }

    pub fn lifecycle(&self) -> Arc<BatchLifecycle> {
        Arc::new(BatchLifecycle::new(self.metadata.clone(), self.outbox.clone(), self.queue.clone()))
    }

    pub fn drain_jobs(&mut self) -> Vec<ComparisonJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}

fn unavailable() -> StoreError {
    StoreError::Transient("store unavailable".into())
}

/// Delegado con fallas inyectables: `get_message`, claims y stores de
/// comparaciones fallan con un error transitorio; `resolve` puede sellar el
/// batch recién resuelto y `put_message` puede encontrarse el slot ocupado.
pub struct FlakyMetadata {
    pub inner: Arc<InMemoryMetadataStore>,
    pub failing: AtomicBool,
    pub failing_claims: AtomicBool,
    pub failing_stores: AtomicBool,
    seal_after_resolve: AtomicBool,
    intruder: Mutex<Option<DecodedMessage>>,
}

impl FlakyMetadata {
    pub fn new(inner: Arc<InMemoryMetadataStore>) -> Self {
        Self { inner,
               failing: AtomicBool::new(false),
               failing_claims: AtomicBool::new(false),
               failing_stores: AtomicBool::new(false),
               seal_after_resolve: AtomicBool::new(false),
               intruder: Mutex::new(None) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_claims(&self, failing: bool) {
        self.failing_claims.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_stores(&self, failing: bool) {
        self.failing_stores.store(failing, Ordering::SeqCst);
    }

    /// El próximo `resolve` sella el batch resuelto antes de devolverlo.
    pub fn seal_after_resolve(&self) {
        self.seal_after_resolve.store(true, Ordering::SeqCst);
    }

    /// El próximo `put_message` persiste antes `body` en el mismo slot.
    pub fn intrude_before_put(&self, body: DecodedMessage) {
        *self.intruder.lock().unwrap() = Some(body);
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadata {
    async fn create_team(&self, slug: &str) -> Result<Team, StoreError> {
        self.inner.create_team(slug).await
    }
    async fn create_suite(&self, team_id: Uuid, slug: &str, retain: bool) -> Result<Suite, StoreError> {
        self.inner.create_suite(team_id, slug, retain).await
    }
    async fn create_batch(&self, suite_id: Uuid, slug: &str, at: DateTime<Utc>) -> Result<Batch, StoreError> {
        self.inner.create_batch(suite_id, slug, at).await
    }
    async fn create_element(&self, suite_id: Uuid, slug: &str) -> Result<Element, StoreError> {
        self.inner.create_element(suite_id, slug).await
    }
    async fn resolve(&self, team: &str, suite: &str, batch: &str, element: &str)
                     -> Result<Option<Destination>, StoreError> {
        let dest = self.inner.resolve(team, suite, batch, element).await?;
        if let Some(d) = &dest {
            if self.seal_after_resolve.swap(false, Ordering::SeqCst) {
                self.inner.seal_batch(d.batch.id, Utc::now()).await?;
            }
        }
        Ok(dest)
    }
    async fn get_suite(&self, id: Uuid) -> Result<Option<Suite>, StoreError> {
        self.inner.get_suite(id).await
    }
    async fn list_suites(&self) -> Result<Vec<Suite>, StoreError> {
        self.inner.list_suites().await
    }
    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError> {
        self.inner.get_batch(id).await
    }
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        self.inner.list_batches().await
    }
    async fn seal_batch(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<SealOutcome, StoreError> {
        self.inner.seal_batch(batch_id, at).await
    }
    async fn promote_baseline(&self, suite_id: Uuid, batch_id: Uuid, by: &str, reason: &str, at: DateTime<Utc>)
                              -> Result<Option<PromotionRecord>, StoreError> {
        self.inner.promote_baseline(suite_id, batch_id, by, reason, at).await
    }
    async fn list_promotions(&self, suite_id: Uuid) -> Result<Vec<PromotionRecord>, StoreError> {
        self.inner.list_promotions(suite_id).await
    }
    async fn put_message(&self, new: NewMessage, allow_overwrite: bool) -> Result<PutMessageOutcome, StoreError> {
        let intruder = self.intruder.lock().unwrap().take();
        if let Some(body) = intruder {
            let first = NewMessage { id: Uuid::new_v4(),
                                     body,
                                     artifacts: Vec::new(),
                                     received_at: Utc::now(),
                                     ..new.clone() };
            self.inner.put_message(first, false).await?;
        }
        self.inner.put_message(new, allow_overwrite).await
    }
    async fn get_message(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get_message(id).await
    }
    async fn current_message(&self, batch_id: Uuid, element_id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        self.inner.current_message(batch_id, element_id).await
    }
    async fn list_messages(&self, batch_id: Uuid) -> Result<Vec<MessageRecord>, StoreError> {
        self.inner.list_messages(batch_id).await
    }
    async fn prune_message(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<MessageRecord>, StoreError> {
        self.inner.prune_message(id, at).await
    }
    async fn register_comparison(&self, key: ComparisonKey, version: u64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.register_comparison(key, version, at).await
    }
    async fn claim_comparison(&self, key: ComparisonKey, version: u64) -> Result<ClaimOutcome, StoreError> {
        if self.failing_claims.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.claim_comparison(key, version).await
    }
    async fn release_claim(&self, key: ComparisonKey) -> Result<(), StoreError> {
        self.inner.release_claim(key).await
    }
    async fn store_comparison(&self, record: ComparisonRecord) -> Result<StoreComparisonOutcome, StoreError> {
        if self.failing_stores.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.store_comparison(record).await
    }
    async fn get_comparison(&self, key: ComparisonKey) -> Result<Option<ComparisonRecord>, StoreError> {
        self.inner.get_comparison(key).await
    }
    async fn list_comparisons(&self) -> Result<Vec<ComparisonRecord>, StoreError> {
        self.inner.list_comparisons().await
    }
    async fn mark_reported(&self, key: ComparisonKey) -> Result<bool, StoreError> {
        self.inner.mark_reported(key).await
    }
    async fn park_failed_job(&self, job: FailedJob) -> Result<(), StoreError> {
        self.inner.park_failed_job(job).await
    }
    async fn list_failed_jobs(&self) -> Result<Vec<FailedJob>, StoreError> {
        self.inner.list_failed_jobs().await
    }
    async fn claim_announcement(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.claim_announcement(key).await
    }
    async fn release_announcement(&self, key: &str) -> Result<(), StoreError> {
        self.inner.release_announcement(key).await
    }
    async fn claim_owner(&self, user: &str) -> Result<bool, StoreError> {
        self.inner.claim_owner(user).await
    }
    async fn owner(&self) -> Result<Option<String>, StoreError> {
        self.inner.owner().await
    }
}

/// Outbox cuyo `append_kind` falla mientras `failing` esté activo.
pub struct FlakyOutbox {
    pub inner: Arc<InMemoryOutbox>,
    failing: AtomicBool,
}

impl FlakyOutbox {
    pub fn new(inner: Arc<InMemoryOutbox>) -> Self {
        Self { inner,
               failing: AtomicBool::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Outbox for FlakyOutbox {
    async fn append_kind(&self, kind: PipelineEventKind) -> Result<PipelineEvent, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Transient("outbox down".into()));
        }
        self.inner.append_kind(kind).await
    }
    async fn list_pending(&self) -> Result<Vec<PipelineEvent>, StoreError> {
        self.inner.list_pending().await
    }
    async fn acknowledge(&self, seq: u64) -> Result<bool, StoreError> {
        self.inner.acknowledge(seq).await
    }
    async fn list_all(&self) -> Result<Vec<PipelineEvent>, StoreError> {
        self.inner.list_all().await
    }
}

/// Artifact store que devuelve el contenido alterado al releerlo.
pub struct CorruptingArtifacts {
    pub inner: Arc<InMemoryArtifactStore>,
}

#[async_trait]
impl ArtifactStore for CorruptingArtifacts {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, bytes).await
    }
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut bytes = self.inner.get(key).await?;
        if let Some(first) = bytes.first_mut() {
            *first ^= 0xff;
        }
        Ok(bytes)
    }
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}
