//! rf-core: valores de resultado, codec binario, motor de comparación y
//! contratos de almacenamiento del pipeline.
pub mod codec;
pub mod compare;
pub mod constants;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod message;
pub mod model;
pub mod store;
pub mod value;

pub use codec::{decode, encode, DecodeError, EncodeError};
pub use compare::{compare, CompareOptions, ComparisonEngine, ComparisonResult, FloatRule, Verdict};
pub use errors::StoreError;
pub use event::{InMemoryOutbox, Outbox, PipelineEvent, PipelineEventKind};
pub use message::{ArtifactRef, DecodedMessage, EmbeddedArtifact, MessageMetadata, MessageOverview};
pub use model::{Batch, BatchState, ComparisonKey, ComparisonRecord, ComparisonState, Destination, Element, FailedJob,
                MessageRecord, NewMessage, PromotionRecord, Suite, Team};
pub use store::{ArtifactStore, ClaimOutcome, InMemoryArtifactStore, InMemoryMetadataStore, MetadataStore,
                PutMessageOutcome, SealOutcome, StoreComparisonOutcome};
pub use value::{ResultValue, ValueKind};
