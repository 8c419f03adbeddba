//! Mensaje decodificado: resultado de ejecutar un Element dentro de un Batch.
//!
//! `DecodedMessage` es la representación en memoria del formato binario
//! (ver `codec`). Es la entrada del motor de comparación y lo que se persiste
//! como cuerpo del mensaje en el `MetadataStore`.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;
use crate::value::ResultValue;

/// Bloque de metadatos enviado por el SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub team: String,
    pub suite: String,
    pub batch: String,
    pub element: String,
    /// Versión del software bajo prueba (texto libre del cliente).
    pub built_at: String,
    /// Precisión de milisegundos (es lo que transporta el formato binario).
    pub submitted_at: DateTime<Utc>,
}

/// Artifact embebido en el mensaje tal como llega del cliente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedArtifact {
    pub key: String,
    pub content: Vec<u8>,
}

/// Referencia persistida a un artifact (sin contenido).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub key: String,
    pub length: u64,
    /// SHA-256 hex del contenido almacenado.
    pub sha256: String,
}

impl ArtifactRef {
    pub fn for_content(key: &str, content: &[u8]) -> Self {
        Self { key: key.to_string(),
               length: content.len() as u64,
               sha256: sha256_hex(content) }
    }

    /// Verifica que un contenido leído del store coincide con la referencia.
    pub fn verify(&self, content: &[u8]) -> bool {
        content.len() as u64 == self.length && sha256_hex(content) == self.sha256
    }
}

/// Contadores agregados de un mensaje.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageOverview {
    pub keys_count: usize,
    pub metrics_count: usize,
    pub metrics_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub metadata: MessageMetadata,
    pub results: IndexMap<String, ResultValue>,
    pub metrics: IndexMap<String, i64>,
    pub artifacts: Vec<EmbeddedArtifact>,
}

impl DecodedMessage {
    pub fn new(metadata: MessageMetadata) -> Self {
        Self { metadata,
               results: IndexMap::new(),
               metrics: IndexMap::new(),
               artifacts: Vec::new() }
    }

    pub fn with_result(mut self, key: &str, value: impl Into<ResultValue>) -> Self {
        self.results.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metric(mut self, name: &str, duration: i64) -> Self {
        self.metrics.insert(name.to_string(), duration);
        self
    }

    pub fn with_artifact(mut self, key: &str, content: Vec<u8>) -> Self {
        self.artifacts.push(EmbeddedArtifact { key: key.to_string(), content });
        self
    }

    pub fn overview(&self) -> MessageOverview {
        MessageOverview { keys_count: self.results.len(),
                          metrics_count: self.metrics.len(),
                          metrics_duration: self.metrics.values().fold(0i64, |acc, v| acc.saturating_add(*v)) }
    }

    pub fn artifact_refs(&self) -> Vec<ArtifactRef> {
        self.artifacts.iter().map(|a| ArtifactRef::for_content(&a.key, &a.content)).collect()
    }

    /// Copia del mensaje sin el contenido de los artifacts (el contenido vive
    /// en el `ArtifactStore`; el cuerpo persistido sólo guarda referencias).
    pub fn without_artifact_content(&self) -> Self {
        Self { metadata: self.metadata.clone(),
               results: self.results.clone(),
               metrics: self.metrics.clone(),
               artifacts: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta() -> MessageMetadata {
        MessageMetadata { team: "acme".into(),
                          suite: "students".into(),
                          batch: "v1.0".into(),
                          element: "alice".into(),
                          built_at: "v1.0".into(),
                          submitted_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() }
    }

    #[test]
    fn overview_counts_keys_and_metric_durations() {
        let m = DecodedMessage::new(meta()).with_result("a", 1i64)
                                           .with_result("b", "x")
                                           .with_metric("load", 10)
                                           .with_metric("save", 32);
        let o = m.overview();
        assert_eq!(o.keys_count, 2);
        assert_eq!(o.metrics_count, 2);
        assert_eq!(o.metrics_duration, 42);
    }

    #[test]
    fn artifact_ref_verifies_content() {
        let r = ArtifactRef::for_content("log", b"hello");
        assert_eq!(r.length, 5);
        assert!(r.verify(b"hello"));
        assert!(!r.verify(b"hellp"));
    }
}
