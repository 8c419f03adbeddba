//! Schedulers periódicos: auto-seal, retención, reporting, analytics y
//! telemetría.
//!
//! Cada tarea corre en su propio intervalo. Si una pasada sigue en curso
//! cuando vence el siguiente tick, ese tick se salta: nunca hay dos pasadas
//! solapadas de la misma tarea. Al recibir shutdown la pasada en curso
//! termina antes de salir.

mod analytics;
mod autoseal;
mod reporting;
mod retention;
mod telemetry;

pub use analytics::{AnalyticsCache, AnalyticsSnapshot, AnalyticsTask, BatchSummary, ElementSummary};
pub use autoseal::AutoSealTask;
pub use reporting::ReportingTask;
pub use retention::RetentionTask;
pub use telemetry::TelemetryTask;

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::PipelineError;
use rf_core::{MessageRecord, MetadataStore};

#[async_trait]
pub trait SweepTask: Send + Sync {
    fn name(&self) -> &'static str;
    /// Una pasada completa. Devuelve la cantidad de unidades procesadas.
    async fn sweep(&self) -> Result<usize, PipelineError>;
}

pub struct ScheduledTask {
    task: Arc<dyn SweepTask>,
    interval: Duration,
    running: AtomicBool,
}

impl ScheduledTask {
    pub fn new(task: Arc<dyn SweepTask>, interval: Duration) -> Self {
        Self { task,
               interval,
               running: AtomicBool::new(false) }
    }

    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    /// Ejecuta una pasada salvo que ya haya otra en curso (`None`).
    pub async fn run_once(&self) -> Option<Result<usize, PipelineError>> {
        if self.running
               .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
               .is_err()
        {
            debug!("{}: previous sweep still running, skipping", self.name());
            return None;
        }
        let result = self.task.sweep().await;
        self.running.store(false, Ordering::Release);
        match &result {
            Ok(0) => debug!("{}: nothing to do", self.name()),
            Ok(n) => info!("{}: processed {n}", self.name()),
            Err(e) => warn!("{} sweep failed: {e}", self.name()),
        }
        Some(result)
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // El primer tick es inmediato; la primera pasada espera un intervalo.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            debug!("{} scheduler stopped", self.name());
        })
    }
}

/// Conjunto de tareas programadas con un único canal de shutdown.
pub struct Scheduler {
    tasks: Vec<Arc<ScheduledTask>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn with_task(mut self, task: Arc<dyn SweepTask>, interval: Duration) -> Self {
        self.tasks.push(Arc::new(ScheduledTask::new(task, interval)));
        self
    }

    pub fn tasks(&self) -> &[Arc<ScheduledTask>] {
        &self.tasks
    }

    pub fn spawn_all(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.tasks
            .iter()
            .map(|t| {
                info!("scheduling {} every {:?}", t.name(), t.interval);
                Arc::clone(t).spawn(shutdown.clone())
            })
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// Mensajes de todos los batches, en el orden de `list_batches`.
pub(crate) async fn all_messages(metadata: &dyn MetadataStore) -> Result<Vec<MessageRecord>, PipelineError> {
    let mut messages = Vec::new();
    for batch in metadata.list_batches().await? {
        messages.extend(metadata.list_messages(batch.id).await?);
    }
    Ok(messages)
}
