//! Modelo de dominio persistido por el `MetadataStore`.

mod comparison;
mod entities;

pub use comparison::{ComparisonKey, ComparisonRecord, ComparisonState, FailedJob, PromotionRecord};
pub use entities::{artifact_storage_key, Batch, BatchState, Destination, Element, MessageRecord, NewMessage, Suite,
                   Team};
