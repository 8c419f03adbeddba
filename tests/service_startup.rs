use resultflow::config::AppConfig;
use resultflow::core::{encode, DecodedMessage, MessageMetadata, MetadataStore, ResultValue};
use resultflow::persistence::StoreConfig;
use resultflow::pipeline::{PipelineConfig, SubmissionOutcome};
use resultflow::{build_stores, start_service};

fn config(dir: &std::path::Path) -> AppConfig {
    AppConfig { pipeline: PipelineConfig::default(),
                store: StoreConfig { database_url: None,
                                     artifact_dir: dir.to_path_buf(),
                                     ..StoreConfig::default() } }
}

#[tokio::test]
async fn service_accepts_messages_into_filesystem_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let stores = build_stores(&config).unwrap();
    let metadata = stores.metadata.clone();
    let team = metadata.create_team("acme").await.unwrap();
    let suite = metadata.create_suite(team.id, "students", false).await.unwrap();
    metadata.create_batch(suite.id, "v1", chrono::Utc::now()).await.unwrap();
    metadata.create_element(suite.id, "alice").await.unwrap();

    let service = start_service(&config, stores).await.unwrap();
    let meta = MessageMetadata { team: "acme".into(),
                                 suite: "students".into(),
                                 batch: "v1".into(),
                                 element: "alice".into(),
                                 built_at: "v1".into(),
                                 submitted_at: chrono::Utc::now() };
    let m = DecodedMessage::new(meta).with_result("a", ResultValue::Int(1))
                                     .with_artifact("report.txt", b"ok".to_vec());
    let outcome = service.submissions.submit(encode(&m).unwrap()).await.unwrap();
    let SubmissionOutcome::Accepted { message_id, .. } = outcome else {
        panic!("expected acceptance, got {outcome:?}");
    };
    let stored = std::fs::read(dir.path().join(message_id.to_string()).join("report.txt")).unwrap();
    assert_eq!(stored, b"ok");

    service.shutdown().await;
}

#[test]
fn invalid_environment_is_a_config_error() {
    let err = PipelineConfig::from_lookup(|k| (k == "RF_COMPARISON_MAX_ATTEMPTS").then(|| "zero".to_string()))
        .unwrap_err();
    let app: resultflow::errors::AppError = err.into();
    assert!(app.to_string().contains("RF_COMPARISON_MAX_ATTEMPTS"));
}
