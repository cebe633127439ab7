//! Remote extraction against a mock HTTP server.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use etlflow::error::{ExtractionError, PipelineError};
use etlflow::pipeline::{PipelineConfig, PipelineOrchestrator, PipelineState};
use etlflow::retry::{FailureKind, RetryPolicy};
use etlflow::source::HttpSource;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(5))
}

async fn mount_json(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// Built-in remote source
// ============================================================================

#[tokio::test]
async fn test_remote_pipeline_unwraps_data_envelope() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/records",
        json!({"data": [{"id": 1, "city": "Oslo"}, {"id": 2, "city": null}], "page": 1}),
    )
    .await;

    let config = PipelineConfig::remote(format!("{}/records", server.uri()))
        .with_retry(fast_policy(3));
    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.configure(config).unwrap();

    let records = orchestrator.extract().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records.records()[0]["city"], json!("Oslo"));

    let report = orchestrator.quality_report().unwrap();
    assert_eq!(report.missing_per_field.get("city"), Some(&1));
    assert!(report.completeness < 1.0);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_json(&server, "/flaky", json!([{"ok": true}])).await;

    let source = HttpSource::new(Duration::from_secs(5)).unwrap();
    let fetched = source
        .fetch_records(&format!("{}/flaky", server.uri()), &fast_policy(3))
        .await
        .unwrap();

    assert_eq!(fetched.attempts, 2);
    assert_eq!(fetched.value.len(), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config =
        PipelineConfig::remote(format!("{}/gone", server.uri())).with_retry(fast_policy(5));
    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.configure(config).unwrap();

    let err = orchestrator.extract().await.unwrap_err();
    match err {
        PipelineError::Extraction(ExtractionError::Remote { kind, attempts, .. }) => {
            assert_eq!(kind, FailureKind::ClientError);
            assert_eq!(attempts, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let source = HttpSource::new(Duration::from_secs(5)).unwrap();
    let err = source
        .read_remote(&format!("{}/down", server.uri()), &fast_policy(3))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExtractionError::Remote {
            kind: FailureKind::ServerError,
            attempts: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpSource::new(Duration::from_secs(5)).unwrap();
    let err = source
        .fetch_records(&format!("{}/html", server.uri()), &fast_policy(3))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
    assert_eq!(err.attempts, 1);
}

// ============================================================================
// Bucket batch extraction
// ============================================================================

fn bucket_config(server: &MockServer, files: &[&str]) -> Value {
    json!({
        "data_source": "remote",
        "data_source_path": server.uri(),
        "max_concurrency": 2,
        "plugins": {
            "bucket": {
                "module": "etlflow::plugins::gcs",
                "class": "GcsDataExtractor",
                "enabled": true,
                "bucket_url": format!("{}/bucket/", server.uri()),
                "files": files,
                "max_retries": 2,
                "retry_delay_secs": 0.01
            }
        },
        "stages": {"extract": "bucket"}
    })
}

#[tokio::test]
async fn test_bucket_partial_failure_keeps_successes_in_order() {
    let server = MockServer::start().await;
    mount_json(&server, "/bucket/a.json", json!([{"n": 1}, {"n": 2}])).await;
    mount_json(&server, "/bucket/b.json", json!({"data": [{"n": 3}]})).await;

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator
        .configure_json(bucket_config(&server, &["a.json", "missing.json", "b.json"]))
        .unwrap();

    let records = orchestrator.extract().await.unwrap();
    let ns: Vec<i64> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_bucket_all_failed() {
    let server = MockServer::start().await;

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator
        .configure_json(bucket_config(&server, &["x.json", "y.json"]))
        .unwrap();

    let err = orchestrator.extract().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Extraction(ExtractionError::Batch { succeeded: 0, total: 2, .. })
    ));
}

#[tokio::test]
async fn test_bucket_schema_error_fails_batch() {
    let server = MockServer::start().await;
    mount_json(&server, "/bucket/good.json", json!([{"n": 1}])).await;
    mount_json(&server, "/bucket/bad.json", json!([1, 2, 3])).await;

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator
        .configure_json(bucket_config(&server, &["good.json", "bad.json"]))
        .unwrap();

    let err = orchestrator.extract().await.unwrap_err();
    match err {
        PipelineError::Extraction(ExtractionError::Batch { succeeded, message, .. }) => {
            assert_eq!(succeeded, 1);
            assert!(message.contains("bad.json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Sports odds endpoints
// ============================================================================

async fn mount_sports_api(server: &MockServer) {
    mount_json(
        server,
        "/sports",
        json!({"data": [{"key": "basketball_nba", "title": "NBA"}]}),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .and(query_param("sportKey", "basketball_nba"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "e1",
                    "home_team": "los angeles lakers",
                    "away_team": "boston celtics",
                    "commence_time": "2024-03-01 19:00:00"
                },
                {
                    "id": "e2",
                    "home_team": "miami heat",
                    "commence_time": "2024-03-02T19:00:00Z"
                }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/odds"))
        .and(query_param("eventId", "e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "e1",
                "bookmakers": [{
                    "key": "fanduel",
                    "title": "FanDuel",
                    "markets": [{
                        "key": "spreads",
                        "last_update": "2024-03-01T18:00:00Z",
                        "outcomes": [
                            {"name": "Los Angeles Lakers", "price": 1.91, "point": "-3.5"},
                            {"name": "Boston Celtics", "price": 1.91, "point": 3.5}
                        ]
                    }]
                }]
            }]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/odds"))
        .and(query_param("eventId", "e2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(server)
        .await;
}

fn odds_config(server: &MockServer) -> Value {
    json!({
        "data_source": "remote",
        "data_source_path": server.uri(),
        "plugins": {
            "odds": {
                "module": "etlflow::plugins::fantasyace",
                "class": "FantasyAceCloudFunctions",
                "enabled": true,
                "base_url_sports": format!("{}/sports", server.uri()),
                "base_url_events": format!("{}/events", server.uri()),
                "base_url_event_odds": format!("{}/odds", server.uri()),
                "sport_key": "basketball_nba",
                "limit": 5,
                "max_retries": 2,
                "retry_delay_secs": 0.01
            }
        },
        "stages": {"extract": "odds"}
    })
}

#[tokio::test]
async fn test_failed_event_odds_do_not_halt_other_events() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        "/sports",
        json!([{"key": "basketball_nba", "title": "NBA"}]),
    )
    .await;
    mount_json(
        &server,
        "/events",
        json!([
            {"id": "e1", "home_team": "a", "away_team": "b", "commence_time": "2024-03-01T19:00:00Z"},
            {"id": "e2", "home_team": "c", "away_team": "d", "commence_time": "2024-03-01T21:00:00Z"}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/odds"))
        .and(query_param("eventId", "e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "bookmakers": [{
                    "key": "fanduel",
                    "title": "FanDuel",
                    "markets": [{
                        "key": "h2h",
                        "last_update": "2024-03-01T18:00:00Z",
                        "outcomes": [{"name": "A", "price": 1.5}, {"name": "B", "price": 2.5}]
                    }]
                }]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/odds"))
        .and(query_param("eventId", "e2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.configure_json(odds_config(&server)).unwrap();

    let records = orchestrator.extract().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["id"] == json!("e1")));
}

#[tokio::test]
async fn test_all_event_odds_failing_fails_extract() {
    let server = MockServer::start().await;
    mount_json(&server, "/sports", json!([])).await;
    mount_json(
        &server,
        "/events",
        json!([{"id": "e1", "home_team": "a", "away_team": "b", "commence_time": "2024-03-01"}]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/odds"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.configure_json(odds_config(&server)).unwrap();

    let err = orchestrator.extract().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Extraction(ExtractionError::Batch { succeeded: 0, total: 1, .. })
    ));
}

#[tokio::test]
async fn test_sports_odds_end_to_end() {
    let server = MockServer::start().await;
    mount_sports_api(&server).await;
    let output = tempfile::tempdir().unwrap();

    let config = json!({
        "data_source": "remote",
        "data_source_path": server.uri(),
        "plugins": {
            "odds": {
                "module": "etlflow::plugins::fantasyace",
                "class": "FantasyAceCloudFunctions",
                "enabled": true,
                "base_url_sports": format!("{}/sports", server.uri()),
                "base_url_events": format!("{}/events", server.uri()),
                "base_url_event_odds": format!("{}/odds", server.uri()),
                "sport_key": "basketball_nba",
                "limit": 5,
                "max_retries": 1,
                "retry_delay_secs": 0.01
            },
            "normalize": {
                "module": "etlflow::plugins::sports",
                "class": "SportsOddsTransformer",
                "enabled": true,
                "source": "mock-api"
            }
        },
        "stages": {"extract": "odds", "transform": "normalize"}
    });

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.configure_json(config).unwrap();

    // e2 has no away team and no odds, so only e1's two outcomes survive.
    let extracted = orchestrator.extract().await.unwrap();
    assert_eq!(extracted.len(), 2);
    assert_eq!(extracted.records()[0]["sport_title"], json!("NBA"));

    let transformed = orchestrator.transform().unwrap();
    let first = &transformed.records()[0];
    assert_eq!(first["home_team"], json!("Los Angeles Lakers"));
    assert_eq!(first["commence_time"], json!("2024-03-01T19:00:00Z"));
    assert_eq!(first["outcome_point"], json!(-3.5));
    assert_eq!(first["source"], json!("mock-api"));
    assert!(first["processed_at"].is_string());

    let prefix = output.path().join("odds").to_string_lossy().into_owned();
    let outputs = orchestrator.load(&prefix, "csv").await.unwrap();

    let mut reader = csv::Reader::from_path(&outputs[0]).unwrap();
    assert_eq!(reader.headers().unwrap().len(), 15);
    assert_eq!(reader.records().count(), 2);
}
