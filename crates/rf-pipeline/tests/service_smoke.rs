mod common;

use common::{message, wire, Harness};
use rf_core::{MetadataStore, ResultValue};
use rf_pipeline::{ComparisonLookup, MemoryNotifier, PipelineConfig, PipelineService, Stores, SubmissionOutcome};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submissions_flow_through_to_ready_comparisons() {
    let h = Harness::new().await;
    let notifier = Arc::new(MemoryNotifier::new());
    let config = PipelineConfig { reporting_interval: Duration::from_millis(20),
                                  comparison_backoff: Duration::from_millis(1),
                                  comparison_backoff_max: Duration::from_millis(5),
                                  ..PipelineConfig::default() };
    let stores = Stores { metadata: h.metadata.clone(),
                          artifacts: h.artifacts.clone(),
                          outbox: h.outbox.clone(),
                          notifier: notifier.clone() };
    let service = PipelineService::start(&config, stores).await.unwrap();

    let base = message("v1", "alice", &[("a", ResultValue::Int(1))]);
    assert!(matches!(service.submissions.submit(wire(&base)).await.unwrap(), SubmissionOutcome::Accepted { .. }));
    service.lifecycle.promote(h.suite.id, h.v1.id, "ops", "release").await.unwrap();

    let cand = message("v2", "alice", &[("a", ResultValue::Int(1))]);
    let SubmissionOutcome::Accepted { message_id, comparison_enqueued: true } =
        service.submissions.submit(wire(&cand)).await.unwrap()
    else {
        panic!("candidate must be accepted with a comparison");
    };
    let baseline_id = h.metadata.current_message(h.v1.id, h.alice.id).await.unwrap().unwrap().id;

    let lookup = tokio::time::timeout(Duration::from_secs(5), async {
                     loop {
                         match service.reader.get_comparison(message_id, baseline_id).await.unwrap() {
                             ComparisonLookup::Ready(result) => return result,
                             _ => tokio::time::sleep(Duration::from_millis(5)).await,
                         }
                     }
                 }).await
                   .unwrap();
    assert!(lookup.is_identical());

    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
                        loop {
                            let d = notifier.delivered();
                            if d.iter().any(|e| e.kind.type_name() == "comparison-ready") {
                                return d.len();
                            }
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }).await
                      .unwrap();
    assert!(delivered >= 2);

    service.shutdown().await;
}
