//! Trait `MetadataStore` y resultados de sus operaciones atómicas.
//!
//! Es la única fuente de verdad del estado de batches, existencia de mensajes
//! y comparaciones. Toda coordinación entre workers (sellado, duplicados,
//! promoción de baseline, claim de comparaciones, owner de la plataforma)
//! pasa por estas operaciones, nunca por estado compartido en memoria del
//! proceso.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::model::{Batch, ComparisonKey, ComparisonRecord, Destination, Element, FailedJob, MessageRecord, NewMessage,
                   PromotionRecord, Suite, Team};

/// Resultado de `put_message`. Las variantes de rechazo no mutan nada.
#[derive(Debug, Clone, PartialEq)]
pub enum PutMessageOutcome {
    Inserted(MessageRecord),
    /// El mensaje previo del mismo (batch, element) fue reemplazado.
    Replaced { record: MessageRecord, previous: MessageRecord },
    BatchSealed,
    Duplicate { existing: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SealOutcome {
    /// Esta llamada realizó la transición `Open -> Sealed`.
    Sealed(Batch),
    AlreadySealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Otro worker tiene el par en curso.
    InFlight,
    /// Ya existe un resultado para esa versión del candidato.
    AlreadyComputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreComparisonOutcome {
    Stored,
    /// El candidato fue reemplazado o ya hay un registro más nuevo; se descarta.
    Stale,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    // --- dominio de producto -------------------------------------------------
    async fn create_team(&self, slug: &str) -> Result<Team, StoreError>;
    async fn create_suite(&self, team_id: Uuid, slug: &str, retain_indefinitely: bool) -> Result<Suite, StoreError>;
    async fn create_batch(&self, suite_id: Uuid, slug: &str, at: DateTime<Utc>) -> Result<Batch, StoreError>;
    async fn create_element(&self, suite_id: Uuid, slug: &str) -> Result<Element, StoreError>;
    /// Resuelve los slugs de un mensaje; `None` si alguno no existe.
    async fn resolve(&self, team: &str, suite: &str, batch: &str, element: &str)
                     -> Result<Option<Destination>, StoreError>;
    async fn get_suite(&self, id: Uuid) -> Result<Option<Suite>, StoreError>;
    async fn list_suites(&self) -> Result<Vec<Suite>, StoreError>;
    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError>;
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError>;

    // --- ciclo de vida -------------------------------------------------------
    /// Compare-and-swap `Open -> Sealed`.
    async fn seal_batch(&self, batch_id: Uuid, at: DateTime<Utc>) -> Result<SealOutcome, StoreError>;
    /// Intercambia atómicamente el baseline de la suite. `None` si el batch ya
    /// era el baseline vigente.
    async fn promote_baseline(&self,
                              suite_id: Uuid,
                              batch_id: Uuid,
                              by: &str,
                              reason: &str,
                              at: DateTime<Utc>)
                              -> Result<Option<PromotionRecord>, StoreError>;
    async fn list_promotions(&self, suite_id: Uuid) -> Result<Vec<PromotionRecord>, StoreError>;

    // --- mensajes ------------------------------------------------------------
    /// Inserta el mensaje verificando, en la misma operación, que el batch siga
    /// abierto y que no exista otro mensaje para (batch, element) salvo que
    /// `allow_overwrite` lo permita.
    async fn put_message(&self, new: NewMessage, allow_overwrite: bool) -> Result<PutMessageOutcome, StoreError>;
    async fn get_message(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError>;
    async fn current_message(&self, batch_id: Uuid, element_id: Uuid) -> Result<Option<MessageRecord>, StoreError>;
    async fn list_messages(&self, batch_id: Uuid) -> Result<Vec<MessageRecord>, StoreError>;
    /// Descarta el cuerpo decodificado y deja el registro como tombstone.
    /// Devuelve el registro previo (con sus referencias de artifacts) o `None`
    /// si no existe o ya estaba podado.
    async fn prune_message(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<MessageRecord>, StoreError>;

    // --- comparaciones -------------------------------------------------------
    /// Registra la comparación como `Pending` si no existe todavía.
    async fn register_comparison(&self, key: ComparisonKey, candidate_version: u64, at: DateTime<Utc>)
                                 -> Result<(), StoreError>;
    async fn claim_comparison(&self, key: ComparisonKey, candidate_version: u64) -> Result<ClaimOutcome, StoreError>;
    async fn release_claim(&self, key: ComparisonKey) -> Result<(), StoreError>;
    /// Persiste el registro si el candidato sigue vigente en esa versión.
    async fn store_comparison(&self, record: ComparisonRecord) -> Result<StoreComparisonOutcome, StoreError>;
    async fn get_comparison(&self, key: ComparisonKey) -> Result<Option<ComparisonRecord>, StoreError>;
    async fn list_comparisons(&self) -> Result<Vec<ComparisonRecord>, StoreError>;
    /// Compare-and-swap `reported: false -> true`.
    async fn mark_reported(&self, key: ComparisonKey) -> Result<bool, StoreError>;
    async fn park_failed_job(&self, job: FailedJob) -> Result<(), StoreError>;
    async fn list_failed_jobs(&self) -> Result<Vec<FailedJob>, StoreError>;

    // --- anuncios ------------------------------------------------------------
    /// Reserva la emisión del evento identificado por `key`. Sólo el primer
    /// llamador recibe `true`; así un evento de estado se emite una única vez
    /// aunque la transición y el outbox vivan en stores distintos.
    async fn claim_announcement(&self, key: &str) -> Result<bool, StoreError>;
    /// Devuelve una reserva cuyo evento no pudo agregarse al outbox.
    async fn release_announcement(&self, key: &str) -> Result<(), StoreError>;

    // --- roles ---------------------------------------------------------------
    /// Inserta el rol owner sólo si no existe: el primer llamador gana.
    async fn claim_owner(&self, user: &str) -> Result<bool, StoreError>;
    async fn owner(&self) -> Result<Option<String>, StoreError>;
}
