//! Arranque del pipeline completo: colas, consumers y schedulers sobre un
//! conjunto de stores.
use chrono::Utc;
use log::info;
use rf_core::{ArtifactStore, ComparisonEngine, MetadataStore, Outbox};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::comparison::{ComparisonConsumer, ComparisonReader};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ingestion::IngestionConsumer;
use crate::lifecycle::BatchLifecycle;
use crate::notifier::Notifier;
use crate::queue::{ComparisonQueue, IngestionQueue};
use crate::scheduler::{AnalyticsCache, AnalyticsTask, AutoSealTask, ReportingTask, RetentionTask, Scheduler,
                       TelemetryTask};

const INGESTION_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct Stores {
    pub metadata: Arc<dyn MetadataStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub outbox: Arc<dyn Outbox>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct PipelineService {
    pub submissions: IngestionQueue,
    pub lifecycle: Arc<BatchLifecycle>,
    pub reader: Arc<ComparisonReader>,
    pub analytics: Arc<AnalyticsCache>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl PipelineService {
    /// Lanza consumers y schedulers, y reconcilia las comparaciones que
    /// hubieran quedado sin calcular.
    pub async fn start(config: &PipelineConfig, stores: Stores) -> Result<Self, PipelineError> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (comparison_queue, comparison_rx) = ComparisonQueue::new();
        let (submissions, submission_rx) = IngestionQueue::new(INGESTION_QUEUE_CAPACITY);
        let retry = config.retry_policy();

        let ingestion = Arc::new(IngestionConsumer::new(stores.metadata.clone(),
                                                        stores.artifacts.clone(),
                                                        comparison_queue.clone(),
                                                        config.allow_overwrite,
                                                        retry).with_artifact_verification(config.verify_artifacts));
        let comparisons = Arc::new(ComparisonConsumer::new(stores.metadata.clone(),
                                                           stores.outbox.clone(),
                                                           ComparisonEngine::default(),
                                                           retry,
                                                           config.comparison_workers));
        let lifecycle = Arc::new(BatchLifecycle::new(stores.metadata.clone(), stores.outbox.clone(), comparison_queue));
        let analytics = Arc::new(AnalyticsCache::new());

        let scheduler =
            Scheduler::new().with_task(Arc::new(AutoSealTask::new(stores.metadata.clone(),
                                                                  lifecycle.clone(),
                                                                  config.autoseal_inactivity)),
                                       config.autoseal_interval)
                            .with_task(Arc::new(RetentionTask::new(stores.metadata.clone(),
                                                                   stores.artifacts.clone(),
                                                                   config.retention_max_age)),
                                       config.retention_interval)
                            .with_task(Arc::new(ReportingTask::new(stores.metadata.clone(),
                                                                   stores.outbox.clone(),
                                                                   stores.notifier.clone())),
                                       config.reporting_interval)
                            .with_task(Arc::new(AnalyticsTask::new(stores.metadata.clone(), analytics.clone())),
                                       config.analytics_interval)
                            .with_task(Arc::new(TelemetryTask::new(stores.metadata.clone(),
                                                                   stores.outbox.clone(),
                                                                   config.telemetry_enabled,
                                                                   Utc::now())),
                                       config.telemetry_interval);

        let mut handles = vec![tokio::spawn(ingestion.run(submission_rx, shutdown_rx.clone())),
                               tokio::spawn(comparisons.run(comparison_rx, shutdown_rx.clone()))];
        handles.extend(scheduler.spawn_all(shutdown_rx));

        let recovered = lifecycle.reconcile_all().await?;
        info!("pipeline started ({recovered} comparisons recovered)");

        Ok(Self { submissions,
                  lifecycle,
                  reader: Arc::new(ComparisonReader::new(stores.metadata)),
                  analytics,
                  shutdown,
                  handles })
    }

    /// Señala shutdown y espera a que cada tarea termine su trabajo en curso.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("pipeline stopped");
    }
}
