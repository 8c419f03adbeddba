mod common;

use chrono::{Duration, Utc};
use common::{message, wire, FlakyOutbox, Harness};
use rf_core::{ArtifactStore, MetadataStore, Outbox, PipelineEventKind, ResultValue};
use rf_pipeline::{AnalyticsCache, AnalyticsTask, AutoSealTask, BatchLifecycle, MemoryNotifier, ReportingTask, RetentionTask,
                  SubmissionOutcome, SweepTask, TelemetryTask};
use std::sync::Arc;
use uuid::Uuid;

async fn submit(h: &Harness, batch: &str, element: &str, value: i64) -> Uuid {
    let m = message(batch, element, &[("a", ResultValue::Int(value))]).with_artifact("out.txt", b"data".to_vec());
    match h.ingestion(false).submit(&wire(&m)).await.unwrap() {
        SubmissionOutcome::Accepted { message_id, .. } => message_id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

fn count_kind(events: &[rf_core::PipelineEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind.type_name() == kind).count()
}

#[tokio::test]
async fn sealing_twice_emits_a_single_event() {
    let h = Harness::new().await;
    let lifecycle = h.lifecycle();
    let (a, b) = tokio::join!(lifecycle.seal(h.v1.id), lifecycle.seal(h.v1.id));
    let transitions = [a.unwrap(), b.unwrap()].iter().filter(|s| s.is_some()).count();
    assert_eq!(transitions, 1);
    assert!(lifecycle.seal(h.v1.id).await.unwrap().is_none());

    let events = h.outbox.list_all().await.unwrap();
    assert_eq!(count_kind(&events, "batch-sealed"), 1);
    assert!(h.metadata.get_batch(h.v1.id).await.unwrap().unwrap().is_sealed());
}

#[tokio::test]
async fn seal_event_lost_to_outbox_is_emitted_later_once() {
    let h = Harness::new().await;
    let outbox = Arc::new(FlakyOutbox::new(h.outbox.clone()));
    let lifecycle = BatchLifecycle::new(h.metadata.clone(), outbox.clone(), h.queue.clone());

    outbox.set_failing(true);
    assert!(lifecycle.seal(h.v1.id).await.unwrap().is_some());
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "batch-sealed"), 0);
    assert!(lifecycle.seal(h.v1.id).await.unwrap().is_none());
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "batch-sealed"), 0);

    outbox.set_failing(false);
    assert!(lifecycle.seal(h.v1.id).await.unwrap().is_none());
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "batch-sealed"), 1);
    assert!(lifecycle.seal(h.v1.id).await.unwrap().is_none());
    assert_eq!(lifecycle.announce_pending().await.unwrap(), 0);
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "batch-sealed"), 1);
}

#[tokio::test]
async fn promotion_event_lost_to_outbox_is_recovered_by_autoseal() {
    let h = Harness::new().await;
    let outbox = Arc::new(FlakyOutbox::new(h.outbox.clone()));
    let lifecycle = Arc::new(BatchLifecycle::new(h.metadata.clone(), outbox.clone(), h.queue.clone()));

    outbox.set_failing(true);
    let record = lifecycle.promote(h.suite.id, h.v1.id, "ops", "release").await.unwrap().unwrap();
    assert_eq!(record.to, h.v1.id);
    assert!(lifecycle.promote(h.suite.id, h.v1.id, "ops", "again").await.unwrap().is_none());
    assert!(h.outbox.list_all().await.unwrap().is_empty());

    outbox.set_failing(false);
    let task = AutoSealTask::new(h.metadata.clone(), lifecycle.clone(), Duration::minutes(10));
    assert_eq!(task.sweep_at(Utc::now()).await.unwrap(), 0);
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "baseline-promoted"), 1);
    assert_eq!(lifecycle.announce_pending().await.unwrap(), 0);
    assert_eq!(count_kind(&h.outbox.list_all().await.unwrap(), "baseline-promoted"), 1);
}

#[tokio::test]
async fn promotion_records_history_and_reconciles() {
    let mut h = Harness::new().await;
    submit(&h, "v1", "alice", 1).await;
    submit(&h, "v1", "bob", 1).await;
    let cand = submit(&h, "v2", "alice", 2).await;
    submit(&h, "v2", "bob", 2).await;
    assert!(h.drain_jobs().is_empty());

    let lifecycle = h.lifecycle();
    let record = lifecycle.promote(h.suite.id, h.v1.id, "ops", "release 1").await.unwrap().unwrap();
    assert_eq!(record.from, None);
    assert_eq!(record.to, h.v1.id);
    let jobs = h.drain_jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().any(|j| j.key.candidate == cand));

    // Ya es el baseline: sin cambios ni eventos nuevos.
    assert!(lifecycle.promote(h.suite.id, h.v1.id, "ops", "again").await.unwrap().is_none());
    let events = h.outbox.list_all().await.unwrap();
    assert_eq!(count_kind(&events, "baseline-promoted"), 1);

    // Un resultado listo no se vuelve a encolar.
    let consumer = h.comparisons();
    for job in &jobs {
        consumer.process(*job).await.unwrap();
    }
    assert_eq!(lifecycle.reconcile_all().await.unwrap(), 0);

    let second = lifecycle.promote(h.suite.id, h.v2.id, "ops", "release 2").await.unwrap().unwrap();
    assert_eq!(second.from, Some(h.v1.id));
    assert_eq!(h.metadata.list_promotions(h.suite.id).await.unwrap().len(), 2);
    assert_eq!(h.drain_jobs().len(), 2, "v1 messages now compare against v2");
}

#[tokio::test]
async fn autoseal_skips_empty_and_recent_batches() {
    let h = Harness::new().await;
    submit(&h, "v1", "alice", 1).await;
    let task = AutoSealTask::new(h.metadata.clone(), h.lifecycle(), Duration::minutes(10));

    assert_eq!(task.sweep_at(Utc::now()).await.unwrap(), 0);
    assert_eq!(task.sweep_at(Utc::now() + Duration::minutes(11)).await.unwrap(), 1);
    assert!(h.metadata.get_batch(h.v1.id).await.unwrap().unwrap().is_sealed());
    assert!(!h.metadata.get_batch(h.v2.id).await.unwrap().unwrap().is_sealed(), "empty batch stays open");
    assert_eq!(task.sweep_at(Utc::now() + Duration::minutes(30)).await.unwrap(), 0);
}

#[tokio::test]
async fn retention_prunes_old_sealed_messages_only() {
    let h = Harness::new().await;
    let old = submit(&h, "v1", "alice", 1).await;
    let open = submit(&h, "v2", "alice", 1).await;
    h.lifecycle().seal(h.v1.id).await.unwrap();
    let task = RetentionTask::new(h.metadata.clone(), h.artifacts.clone(), Duration::days(90));

    assert_eq!(task.sweep_at(Utc::now()).await.unwrap(), 0);
    let later = Utc::now() + Duration::days(91);
    assert_eq!(task.sweep_at(later).await.unwrap(), 1);

    let tombstone = h.metadata.get_message(old).await.unwrap().unwrap();
    assert!(tombstone.is_pruned());
    assert!(tombstone.body.is_none());
    assert!(h.artifacts.get(&format!("{old}/out.txt")).await.is_err());
    assert!(!h.metadata.get_message(open).await.unwrap().unwrap().is_pruned());
    assert!(h.artifacts.get(&format!("{open}/out.txt")).await.is_ok());

    assert_eq!(task.sweep_at(later).await.unwrap(), 0, "already pruned");
}

#[tokio::test]
async fn retention_respects_indefinite_suites() {
    let h = Harness::with_retention(true).await;
    let id = submit(&h, "v1", "alice", 1).await;
    h.lifecycle().seal(h.v1.id).await.unwrap();
    let task = RetentionTask::new(h.metadata.clone(), h.artifacts.clone(), Duration::days(1));
    assert_eq!(task.sweep_at(Utc::now() + Duration::days(365)).await.unwrap(), 0);
    assert!(!h.metadata.get_message(id).await.unwrap().unwrap().is_pruned());
}

#[tokio::test]
async fn reporting_notifies_each_result_once() {
    let mut h = Harness::new().await;
    submit(&h, "v1", "alice", 1).await;
    h.lifecycle().promote(h.suite.id, h.v1.id, "ops", "release").await.unwrap();
    submit(&h, "v2", "alice", 2).await;
    let consumer = h.comparisons();
    for job in h.drain_jobs() {
        consumer.process(job).await.unwrap();
    }

    let notifier = Arc::new(MemoryNotifier::new());
    let task = ReportingTask::new(h.metadata.clone(), h.outbox.clone(), notifier.clone());

    notifier.set_failing(true);
    assert_eq!(task.sweep().await.unwrap(), 0);
    assert_eq!(h.outbox.list_pending().await.unwrap().len(), 2, "undelivered events stay pending");

    notifier.set_failing(false);
    assert_eq!(task.sweep().await.unwrap(), 2);
    assert_eq!(task.sweep().await.unwrap(), 0);
    let delivered = notifier.delivered();
    assert_eq!(count_kind(&delivered, "comparison-ready"), 1);
    assert_eq!(count_kind(&delivered, "baseline-promoted"), 1);
    assert!(h.metadata.list_comparisons().await.unwrap().iter().all(|r| r.reported));
}

#[tokio::test]
async fn analytics_rebuilds_summaries() {
    let mut h = Harness::new().await;
    submit(&h, "v1", "alice", 1).await;
    submit(&h, "v1", "bob", 1).await;
    h.lifecycle().promote(h.suite.id, h.v1.id, "ops", "release").await.unwrap();
    submit(&h, "v2", "alice", 1).await;
    submit(&h, "v2", "bob", 5).await;
    let consumer = h.comparisons();
    for job in h.drain_jobs() {
        consumer.process(job).await.unwrap();
    }

    let cache = Arc::new(AnalyticsCache::new());
    let task = AnalyticsTask::new(h.metadata.clone(), cache.clone());
    assert_eq!(task.sweep().await.unwrap(), 2);
    let snapshot = cache.snapshot().await;
    assert!(snapshot.computed_at.is_some());

    let v2 = snapshot.batch(h.v2.id).unwrap();
    assert_eq!(v2.messages, 2);
    assert_eq!(v2.comparisons, 2);
    assert_eq!(v2.average_similarity, Some(0.5));
    let v1 = snapshot.batch(h.v1.id).unwrap();
    assert_eq!(v1.comparisons, 0);
    assert_eq!(v1.average_similarity, None);
    let alice = snapshot.element(h.alice.id).unwrap();
    assert_eq!(alice.messages, 2);
    assert_eq!(alice.average_similarity, Some(1.0));

    // Recalcular desde cero produce lo mismo.
    task.sweep().await.unwrap();
    let again = cache.snapshot().await;
    assert_eq!(again.batches, snapshot.batches);
    assert_eq!(again.elements, snapshot.elements);
}

#[tokio::test]
async fn telemetry_reports_usage_since_last_run() {
    let h = Harness::new().await;
    let start = Utc::now() - Duration::seconds(1);
    submit(&h, "v1", "alice", 1).await;
    h.lifecycle().seal(h.v1.id).await.unwrap();

    let disabled = TelemetryTask::new(h.metadata.clone(), h.outbox.clone(), false, start);
    assert_eq!(disabled.sweep().await.unwrap(), 0);

    let task = TelemetryTask::new(h.metadata.clone(), h.outbox.clone(), true, start);
    let now = Utc::now() + Duration::seconds(1);
    assert_eq!(task.sweep_at(now).await.unwrap(), 1);
    assert_eq!(task.sweep_at(now + Duration::hours(1)).await.unwrap(), 1);

    let reports: Vec<_> = h.outbox
                           .list_all()
                           .await
                           .unwrap()
                           .into_iter()
                           .filter_map(|e| match e.kind {
                               PipelineEventKind::UsageReport { messages, sealed_batches, .. } => {
                                   Some((messages, sealed_batches))
                               }
                               _ => None,
                           })
                           .collect();
    assert_eq!(reports, vec![(1, 1), (0, 0)]);
}

#[tokio::test]
async fn artifacts_survive_until_retention() {
    let h = Harness::new().await;
    let id = submit(&h, "v1", "alice", 1).await;
    let content = h.artifacts.get(&format!("{id}/out.txt")).await.unwrap();
    let record = h.metadata.get_message(id).await.unwrap().unwrap();
    assert!(record.artifacts[0].verify(&content));
}
