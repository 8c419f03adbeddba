//! Entidades del dominio: Team, Suite, Batch, Element y Message.
//!
//! Team/Suite/Batch/Element pertenecen al dominio de producto y el pipeline
//! sólo los referencia por id. `MessageRecord` sí es propiedad del pipeline.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{ArtifactRef, DecodedMessage, MessageOverview};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    pub id: Uuid,
    pub team_id: Uuid,
    pub slug: String,
    /// Si es `true`, el scheduler de retención nunca poda sus mensajes.
    pub retain_indefinitely: bool,
    /// Batch marcado como baseline vigente (a lo sumo uno por Suite).
    pub baseline_batch: Option<Uuid>,
}

/// Estado del ciclo de vida de un Batch. La transición es única: `Open -> Sealed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    Open,
    Sealed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub slug: String,
    pub state: BatchState,
    pub created_at: DateTime<Utc>,
    /// Última aceptación de un mensaje; `None` mientras el batch está vacío.
    pub last_submission_at: Option<DateTime<Utc>>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn is_sealed(&self) -> bool {
        self.state == BatchState::Sealed
    }

    /// Clave del anuncio `batch-sealed` de este batch.
    pub fn seal_announcement_key(&self) -> String {
        format!("batch-sealed/{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub slug: String,
}

/// Destino resuelto de un mensaje entrante.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub team: Team,
    pub suite: Suite,
    pub batch: Batch,
    pub element: Element,
}

/// Datos de un mensaje nuevo, antes de que el store le asigne versión.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: Uuid,
    pub team_id: Uuid,
    pub suite_id: Uuid,
    pub batch_id: Uuid,
    pub element_id: Uuid,
    /// Cuerpo sin contenido de artifacts.
    pub body: DecodedMessage,
    pub artifacts: Vec<ArtifactRef>,
    pub received_at: DateTime<Utc>,
}

/// Mensaje persistido. Cuando la retención lo poda, `body` queda en `None` y
/// el registro sobrevive como tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub team_id: Uuid,
    pub suite_id: Uuid,
    pub batch_id: Uuid,
    pub element_id: Uuid,
    /// Monótono por (batch, element): 1 para el primer envío, +1 por cada reemplazo.
    pub version: u64,
    pub built_at: String,
    pub submitted_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub overview: MessageOverview,
    pub artifacts: Vec<ArtifactRef>,
    pub body: Option<DecodedMessage>,
    pub pruned_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    pub fn from_new(new: NewMessage, version: u64) -> Self {
        Self { id: new.id,
               team_id: new.team_id,
               suite_id: new.suite_id,
               batch_id: new.batch_id,
               element_id: new.element_id,
               version,
               built_at: new.body.metadata.built_at.clone(),
               submitted_at: new.body.metadata.submitted_at,
               received_at: new.received_at,
               overview: new.body.overview(),
               artifacts: new.artifacts,
               body: Some(new.body),
               pruned_at: None }
    }

    pub fn is_pruned(&self) -> bool {
        self.pruned_at.is_some()
    }

    /// Clave del artifact en el `ArtifactStore`: `{messageId}/{artifactKey}`.
    pub fn artifact_key(&self, key: &str) -> String {
        artifact_storage_key(self.id, key)
    }
}

pub fn artifact_storage_key(message_id: Uuid, key: &str) -> String {
    format!("{message_id}/{key}")
}
