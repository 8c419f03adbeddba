//! `MetadataStore` en memoria sobre `DashMap`.
//!
//! Las operaciones atómicas se apoyan en el lock por entrada de `DashMap`.
//! Orden de locks: `suites -> batches -> current -> messages` y
//! `comparisons -> messages/current`; ninguna operación adquiere un mapa
//! anterior en ese orden mientras mantiene uno posterior.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::metadata::{ClaimOutcome, MetadataStore, PutMessageOutcome, SealOutcome, StoreComparisonOutcome};
use crate::errors::StoreError;
use crate::model::{Batch, BatchState, ComparisonKey, ComparisonRecord, ComparisonState, Destination, Element, FailedJob,
                   MessageRecord, NewMessage, PromotionRecord, Suite, Team};

const OWNER_ROLE: &str = "owner";

#[derive(Default)]
pub struct InMemoryMetadataStore {
    teams: DashMap<Uuid, Team>,
    team_slugs: DashMap<String, Uuid>,
    suites: DashMap<Uuid, Suite>,
    suite_slugs: DashMap<(Uuid, String), Uuid>,
    batches: DashMap<Uuid, Batch>,
    batch_slugs: DashMap<(Uuid, String), Uuid>,
    elements: DashMap<Uuid, Element>,
    element_slugs: DashMap<(Uuid, String), Uuid>,
    messages: DashMap<Uuid, MessageRecord>,
    /// (batch, element) -> mensaje vigente
    current: DashMap<(Uuid, Uuid), Uuid>,
    comparisons: DashMap<ComparisonKey, ComparisonRecord>,
    claims: DashMap<ComparisonKey, u64>,
    promotions: DashMap<Uuid, Vec<PromotionRecord>>,
    failed: DashMap<ComparisonKey, FailedJob>,
    announcements: DashMap<String, ()>,
    roles: DashMap<String, String>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_ready_for(&self, key: &ComparisonKey, candidate_version: u64) -> bool {
        self.comparisons
            .get(key)
            .map(|r| matches!(r.state, ComparisonState::Ready(_)) && r.candidate_version >= candidate_version)
            .unwrap_or(false)
    }

    fn is_current(&self, candidate: Uuid, candidate_version: u64) -> bool {
        let Some((slot, version)) = self.messages
                                        .get(&candidate)
                                        .map(|m| ((m.batch_id, m.element_id), m.version))
        else {
            return false;
        };
        version == candidate_version && self.current.get(&slot).map(|r| *r) == Some(candidate)
    }
}

fn insert_slug<K>(index: &DashMap<K, Uuid>, key: K, id: Uuid, what: &str) -> Result<(), StoreError>
    where K: std::hash::Hash + Eq
{
    match index.entry(key) {
        Entry::Occupied(_) => Err(StoreError::Conflict(format!("{what} already exists"))),
        Entry::Vacant(v) => {
            v.insert(id);
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create_team(&self, slug: &str) -> Result<Team, StoreError> {
        let team = Team { id: Uuid::new_v4(),
                          slug: slug.to_string() };
        insert_slug(&self.team_slugs, slug.to_string(), team.id, &format!("team {slug}"))?;
        self.teams.insert(team.id, team.clone());
        Ok(team)
    }

    async fn create_suite(&self, team_id: Uuid, slug: &str, retain_indefinitely: bool) -> Result<Suite, StoreError> {
        if !self.teams.contains_key(&team_id) {
            return Err(StoreError::NotFound(format!("team {team_id}")));
        }
        let suite = Suite { id: Uuid::new_v4(),
                            team_id,
                            slug: slug.to_string(),
                            retain_indefinitely,
                            baseline_batch: None };
        insert_slug(&self.suite_slugs, (team_id, slug.to_string()), suite.id, &format!("suite {slug}"))?;
        self.suites.insert(suite.id, suite.clone());
        Ok(suite)
    }

    async fn create_batch(&self, suite_id: Uuid, slug: &str, at: DateTime<Utc>) -> Result<Batch, StoreError> {
        if !self.suites.contains_key(&suite_id) {
            return Err(StoreError::NotFound(format!("suite {suite_id}")));
        }
        let batch = Batch { id: Uuid::new_v4(),
                            suite_id,
                            slug: slug.to_string(),
                            state: BatchState::Open,
                            created_at: at,
                            last_submission_at: None,
                            sealed_at: None };
        insert_slug(&self.batch_slugs, (suite_id, slug.to_string()), batch.id, &format!("batch {slug}"))?;
        self.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn create_element(&self, suite_id: Uuid, slug: &str) -> Result<Element, StoreError> {
        if !self.suites.contains_key(&suite_id) {
            return Err(StoreError::NotFound(format!("suite {suite_id}")));
        }
        let element = Element { id: Uuid::new_v4(),
                                suite_id,
                                slug: slug.to_string() };
        insert_slug(&self.element_slugs, (suite_id, slug.to_string()), element.id, &format!("element {slug}"))?;
        self.elements.insert(element.id, element.clone());
        Ok(element)
    }

    async fn resolve(&self, team: &str, suite: &str, batch: &str, element: &str)
                     -> Result<Option<Destination>, StoreError> {
        let Some(team) = self.team_slugs
                             .get(team)
                             .and_then(|id| self.teams.get(id.value()).map(|t| t.clone()))
        else {
            return Ok(None);
        };
        let Some(suite) = self.suite_slugs
                              .get(&(team.id, suite.to_string()))
                              .and_then(|id| self.suites.get(id.value()).map(|s| s.clone()))
        else {
            return Ok(None);
        };
        let Some(batch) = self.batch_slugs
                              .get(&(suite.id, batch.to_string()))
                              .and_then(|id| self.batches.get(id.value()).map(|b| b.clone()))
        else {
            return Ok(None);
        };
        let Some(element) = self.element_slugs
                                .get(&(suite.id, element.to_string()))
                                .and_then(|id| self.elements.get(id.value()).map(|e| e.clone()))
        else {
            return Ok(None);
        };
        Ok(Some(Destination { team,
                              suite,
                              batch,
                              element }))
    }

    async fn get_suite(&self, id: Uuid) -> Result<Option<Suite>, StoreError> {
        Ok(self.suites.get(&id).map(|s| s.clone()))
    }

    async fn list_suites(&self) -> Result<Vec<Suite>, StoreError> {
        let mut suites: Vec<Suite> = self.suites.iter().map(|s| s.clone()).collect();
        suites.sort_by(|a, b| a.slug.cmp(&b.slug).then(a.id.cmp(&b.id)));
        Ok(suites)
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError> {
        Ok(self.batches.get(&id).map(|b| b.clone()))
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let mut batches: Vec<Batch> = self.batches.iter().map(|b| b.clone()).collect();
        batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(batches)
    }

    async fn seal_batch(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<SealOutcome, StoreError> {
        let mut batch = self.batches
                            .get_mut(&batch_id)
                            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
        if batch.is_sealed() {
            return Ok(SealOutcome::AlreadySealed);
        }
        batch.state = BatchState::Sealed;
        batch.sealed_at = Some(at);
        Ok(SealOutcome::Sealed(batch.clone()))
    }

    async fn promote_baseline(&self,
                              suite_id: Uuid,
                              batch_id: Uuid,
                              by: &str,
                              reason: &str,
                              at: DateTime<Utc>)
                              -> Result<Option<PromotionRecord>, StoreError> {
        let mut suite = self.suites
                            .get_mut(&suite_id)
                            .ok_or_else(|| StoreError::NotFound(format!("suite {suite_id}")))?;
        let belongs = self.batches.get(&batch_id).map(|b| b.suite_id == suite_id).unwrap_or(false);
        if !belongs {
            return Err(StoreError::NotFound(format!("batch {batch_id} in suite {suite_id}")));
        }
        if suite.baseline_batch == Some(batch_id) {
            return Ok(None);
        }
        let record = PromotionRecord { id: Uuid::new_v4(),
                                       suite_id,
                                       from: suite.baseline_batch,
                                       to: batch_id,
                                       by: by.to_string(),
                                       reason: reason.to_string(),
                                       at };
        suite.baseline_batch = Some(batch_id);
        self.promotions.entry(suite_id).or_default().push(record.clone());
        Ok(Some(record))
    }

    async fn list_promotions(&self, suite_id: Uuid) -> Result<Vec<PromotionRecord>, StoreError> {
        Ok(self.promotions.get(&suite_id).map(|p| p.clone()).unwrap_or_default())
    }

    async fn put_message(&self, new: NewMessage, allow_overwrite: bool) -> Result<PutMessageOutcome, StoreError> {
        // El lock del batch se mantiene hasta el final: un seal concurrente
        // espera o ya fue observado.
        let mut batch = self.batches
                            .get_mut(&new.batch_id)
                            .ok_or_else(|| StoreError::NotFound(format!("batch {}", new.batch_id)))?;
        if batch.is_sealed() {
            return Ok(PutMessageOutcome::BatchSealed);
        }
        let slot = (new.batch_id, new.element_id);
        let previous_id = self.current.get(&slot).map(|r| *r);
        let previous = previous_id.and_then(|id| self.messages.get(&id).map(|m| m.clone()));
        if let Some(prev) = &previous {
            if !allow_overwrite {
                return Ok(PutMessageOutcome::Duplicate { existing: prev.id });
            }
        }
        let version = previous.as_ref().map(|p| p.version + 1).unwrap_or(1);
        let received_at = new.received_at;
        let record = MessageRecord::from_new(new, version);
        self.messages.insert(record.id, record.clone());
        self.current.insert(slot, record.id);
        batch.last_submission_at = Some(received_at);

        match previous {
            Some(previous) => {
                self.messages.remove(&previous.id);
                self.comparisons
                    .retain(|k, _| k.candidate != previous.id && k.baseline != previous.id);
                Ok(PutMessageOutcome::Replaced { record, previous })
            }
            None => Ok(PutMessageOutcome::Inserted(record)),
        }
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self.messages.get(&id).map(|m| m.clone()))
    }

    async fn current_message(&self, batch_id: Uuid, element_id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        let id = self.current.get(&(batch_id, element_id)).map(|r| *r);
        Ok(id.and_then(|id| self.messages.get(&id).map(|m| m.clone())))
    }

    async fn list_messages(&self, batch_id: Uuid) -> Result<Vec<MessageRecord>, StoreError> {
        let mut messages: Vec<MessageRecord> =
            self.messages.iter().filter(|m| m.batch_id == batch_id).map(|m| m.clone()).collect();
        messages.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn prune_message(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<MessageRecord>, StoreError> {
        let Some(mut record) = self.messages.get_mut(&id) else {
            return Ok(None);
        };
        if record.is_pruned() {
            return Ok(None);
        }
        let previous = record.clone();
        record.body = None;
        record.artifacts.clear();
        record.pruned_at = Some(at);
        Ok(Some(previous))
    }

    async fn register_comparison(&self, key: ComparisonKey, candidate_version: u64, at: DateTime<Utc>)
                                 -> Result<(), StoreError> {
        match self.comparisons.entry(key) {
            Entry::Occupied(mut o) => {
                if o.get().result().is_none() {
                    o.insert(ComparisonRecord::pending(key, candidate_version, at));
                }
            }
            Entry::Vacant(v) => {
                v.insert(ComparisonRecord::pending(key, candidate_version, at));
            }
        }
        Ok(())
    }

    async fn claim_comparison(&self, key: ComparisonKey, candidate_version: u64) -> Result<ClaimOutcome, StoreError> {
        if self.is_ready_for(&key, candidate_version) {
            return Ok(ClaimOutcome::AlreadyComputed);
        }
        match self.claims.entry(key) {
            Entry::Occupied(_) => return Ok(ClaimOutcome::InFlight),
            Entry::Vacant(v) => {
                v.insert(candidate_version);
            }
        }
        // Un worker pudo persistir y liberar entre el primer chequeo y el claim.
        if self.is_ready_for(&key, candidate_version) {
            self.claims.remove(&key);
            return Ok(ClaimOutcome::AlreadyComputed);
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_claim(&self, key: ComparisonKey) -> Result<(), StoreError> {
        self.claims.remove(&key);
        Ok(())
    }

    async fn store_comparison(&self, mut record: ComparisonRecord) -> Result<StoreComparisonOutcome, StoreError> {
        let entry = self.comparisons.entry(record.key);
        if !self.is_current(record.key.candidate, record.candidate_version) {
            return Ok(StoreComparisonOutcome::Stale);
        }
        match entry {
            Entry::Occupied(mut o) => {
                let existing = o.get();
                if existing.candidate_version > record.candidate_version {
                    return Ok(StoreComparisonOutcome::Stale);
                }
                if existing.candidate_version == record.candidate_version {
                    // Un Ready nunca retrocede a Pending/PendingNoBaseline.
                    if existing.result().is_some() && record.result().is_none() {
                        return Ok(StoreComparisonOutcome::Stale);
                    }
                    let same = matches!((existing.result(), record.result()), (Some(a), Some(b)) if a == b);
                    if same {
                        record.reported = existing.reported;
                    }
                }
                o.insert(record);
            }
            Entry::Vacant(v) => {
                v.insert(record);
            }
        }
        Ok(StoreComparisonOutcome::Stored)
    }

    async fn get_comparison(&self, key: ComparisonKey) -> Result<Option<ComparisonRecord>, StoreError> {
        Ok(self.comparisons.get(&key).map(|r| r.clone()))
    }

    async fn list_comparisons(&self) -> Result<Vec<ComparisonRecord>, StoreError> {
        let mut records: Vec<ComparisonRecord> = self.comparisons.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.key);
        Ok(records)
    }

    async fn mark_reported(&self, key: ComparisonKey) -> Result<bool, StoreError> {
        let Some(mut record) = self.comparisons.get_mut(&key) else {
            return Ok(false);
        };
        if record.reported || record.result().is_none() {
            return Ok(false);
        }
        record.reported = true;
        Ok(true)
    }

    async fn park_failed_job(&self, job: FailedJob) -> Result<(), StoreError> {
        let failed = ComparisonState::Failed { reason: job.last_error.clone() };
        match self.comparisons.entry(job.key) {
            Entry::Occupied(mut o) => {
                if o.get().result().is_none() {
                    let record = o.get_mut();
                    record.state = failed;
                    record.updated_at = job.parked_at;
                }
            }
            Entry::Vacant(v) => {
                v.insert(ComparisonRecord { key: job.key,
                                            candidate_version: job.candidate_version,
                                            state: failed,
                                            reported: false,
                                            updated_at: job.parked_at });
            }
        }
        self.failed.insert(job.key, job);
        Ok(())
    }

    async fn list_failed_jobs(&self) -> Result<Vec<FailedJob>, StoreError> {
        let mut jobs: Vec<FailedJob> = self.failed.iter().map(|j| j.clone()).collect();
        jobs.sort_by(|a, b| a.parked_at.cmp(&b.parked_at).then(a.key.cmp(&b.key)));
        Ok(jobs)
    }

    async fn claim_announcement(&self, key: &str) -> Result<bool, StoreError> {
        match self.announcements.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(());
                Ok(true)
            }
        }
    }

    async fn release_announcement(&self, key: &str) -> Result<(), StoreError> {
        self.announcements.remove(key);
        Ok(())
    }

    async fn claim_owner(&self, user: &str) -> Result<bool, StoreError> {
        match self.roles.entry(OWNER_ROLE.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                v.insert(user.to_string());
                Ok(true)
            }
        }
    }

    async fn owner(&self) -> Result<Option<String>, StoreError> {
        Ok(self.roles.get(OWNER_ROLE).map(|u| u.clone()))
    }
}
