//! Eventos salientes y trait Outbox.

mod store;
mod types;

pub use store::{InMemoryOutbox, Outbox};
pub use types::{PipelineEvent, PipelineEventKind};
