//! rf-pipeline: ingesta, comparación asíncrona, ciclo de vida de batches y
//! schedulers periódicos sobre los contratos de `rf-core`.
pub mod comparison;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod lifecycle;
pub mod notifier;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod service;

pub use comparison::{ComparisonConsumer, ComparisonLookup, ComparisonReader, JobOutcome};
pub use config::{ConfigError, PipelineConfig};
pub use error::{classify, ErrorClass, PipelineError};
pub use ingestion::{IngestionConsumer, IngestionState, RejectReason, SubmissionOutcome};
pub use lifecycle::BatchLifecycle;
pub use notifier::{LogNotifier, MemoryNotifier, Notifier};
pub use queue::{ComparisonJob, ComparisonQueue, IngestionQueue, Submission};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use scheduler::{AnalyticsCache, AnalyticsSnapshot, AnalyticsTask, AutoSealTask, ReportingTask, RetentionTask,
                    ScheduledTask, Scheduler, SweepTask, TelemetryTask};
pub use service::{PipelineService, Stores};
