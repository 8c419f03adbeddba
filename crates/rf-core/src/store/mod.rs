//! Traits de almacenamiento y sus implementaciones en memoria.

mod artifact;
mod memory;
mod metadata;

pub use artifact::{ArtifactStore, InMemoryArtifactStore};
pub use memory::InMemoryMetadataStore;
pub use metadata::{ClaimOutcome, MetadataStore, PutMessageOutcome, SealOutcome, StoreComparisonOutcome};
