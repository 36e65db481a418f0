//! Enrichment cascade tests against a local fake messages endpoint
//!
//! The fake server answers each request with a status chosen by the
//! requested model name and records the order models were tried in.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bevid_common::config::EnrichmentConfig;
use bevid_common::events::EventBus;
use bevid_common::policy::{DecisionPolicy, PredictionSource};
use bevid_common::store::{Dataset, KeyValueStore, TRAINING_DATASET};
use bevid_id::services::{
    AttemptFailure, Enricher, Enrichment, EnrichmentClient, EnrichmentClientConfig,
    EnrichmentError,
};
use bevid_id::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

#[derive(Clone, Default)]
struct FakeApi {
    /// Status per model; unlisted models answer 200
    statuses: Arc<HashMap<String, u16>>,
    /// Models in the order they were requested
    calls: Arc<Mutex<Vec<String>>>,
    /// API keys seen
    keys: Arc<Mutex<Vec<String>>>,
    /// Latency added before every answer
    delay: Option<Duration>,
}

async fn messages(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    api.calls.lock().unwrap().push(model.clone());
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        api.keys.lock().unwrap().push(key.to_string());
    }

    if let Some(delay) = api.delay {
        tokio::time::sleep(delay).await;
    }

    let code = api.statuses.get(&model).copied().unwrap_or(200);
    let status = StatusCode::from_u16(code).unwrap();
    if status.is_success() {
        (
            status,
            Json(json!({
                "id": "msg_test",
                "model": model,
                "content": [{"type": "text", "text": format!("Details from {}", model)}]
            })),
        )
    } else {
        (status, Json(json!({"error": {"message": "unavailable"}})))
    }
}

/// Start the fake endpoint on an ephemeral port
async fn start_fake_api(statuses: &[(&str, u16)]) -> (String, FakeApi) {
    start_fake_api_with_delay(statuses, None).await
}

async fn start_fake_api_with_delay(
    statuses: &[(&str, u16)],
    delay: Option<Duration>,
) -> (String, FakeApi) {
    let api = FakeApi {
        delay,
        statuses: Arc::new(
            statuses
                .iter()
                .map(|(model, code)| (model.to_string(), *code))
                .collect(),
        ),
        ..Default::default()
    };

    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1/messages", addr), api)
}

fn client(endpoint: &str, models: &[&str]) -> EnrichmentClient {
    EnrichmentClient::new(EnrichmentClientConfig {
        endpoint: endpoint.to_string(),
        models: models.iter().map(|m| m.to_string()).collect(),
        api_key: "test-key".to_string(),
        api_version: "2023-06-01".to_string(),
        max_tokens: 64,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_skips_unavailable_models_until_success() {
    let (endpoint, api) = start_fake_api(&[("m-404", 404), ("m-429", 429), ("m-503", 503)]).await;
    let client = client(&endpoint, &["m-404", "m-429", "m-503", "m-ok"]);

    let completion = client.complete("Tell me about Beer").await.unwrap();
    assert_eq!(completion.model, "m-ok");
    assert_eq!(completion.text, "Details from m-ok");
    assert_eq!(completion.skipped.len(), 3);
    assert_eq!(completion.skipped[1].failure, AttemptFailure::Status(429));

    assert_eq!(
        *api.calls.lock().unwrap(),
        vec!["m-404", "m-429", "m-503", "m-ok"]
    );
    assert!(api.keys.lock().unwrap().iter().all(|k| k == "test-key"));
}

#[tokio::test]
async fn test_stops_at_first_success() {
    let (endpoint, api) = start_fake_api(&[]).await;
    let client = client(&endpoint, &["first", "second", "third"]);

    let completion = client.complete("prompt").await.unwrap();
    assert_eq!(completion.model, "first");
    assert!(completion.skipped.is_empty());
    assert_eq!(*api.calls.lock().unwrap(), vec!["first"]);
}

#[tokio::test]
async fn test_all_models_unavailable() {
    let (endpoint, api) = start_fake_api(&[("a", 503), ("b", 429)]).await;
    let client = client(&endpoint, &["a", "b"]);

    match client.complete("prompt").await {
        Err(EnrichmentError::AllModelsFailed(attempts)) => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].model, "a");
            assert_eq!(attempts[0].failure, AttemptFailure::Status(503));
            assert_eq!(attempts[1].failure, AttemptFailure::Status(429));
        }
        other => panic!("Expected AllModelsFailed, got {:?}", other.map(|c| c.model)),
    }
    assert_eq!(api.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_other_error_status_aborts_cascade() {
    let (endpoint, api) = start_fake_api(&[("broken", 500)]).await;
    let client = client(&endpoint, &["broken", "never-called"]);

    match client.complete("prompt").await {
        Err(EnrichmentError::ApiError { model, status, .. }) => {
            assert_eq!(model, "broken");
            assert_eq!(status, 500);
        }
        other => panic!("Expected ApiError, got {:?}", other.map(|c| c.model)),
    }
    assert_eq!(*api.calls.lock().unwrap(), vec!["broken"]);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_every_model() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}/v1/messages", addr), &["a", "b"]);
    match client.complete("prompt").await {
        Err(EnrichmentError::AllModelsFailed(attempts)) => {
            assert_eq!(attempts.len(), 2);
            assert!(matches!(attempts[0].failure, AttemptFailure::Transport(_)));
        }
        other => panic!("Expected AllModelsFailed, got {:?}", other.map(|c| c.model)),
    }
}

#[tokio::test]
async fn test_enricher_from_config() {
    let (endpoint, _api) = start_fake_api(&[("primary", 503)]).await;
    let config = EnrichmentConfig {
        endpoint,
        models: vec!["primary".to_string(), "backup".to_string()],
        ..Default::default()
    };

    let offline = Enricher::from_config(&config, None).unwrap();
    assert!(offline.is_offline());
    assert_eq!(
        offline.enrich("Beer", 0.9, PredictionSource::Knn).await.unwrap(),
        Enrichment::Offline
    );

    let remote = Enricher::from_config(&config, Some("key".to_string())).unwrap();
    assert!(!remote.is_offline());
    match remote.enrich("Beer", 0.9, PredictionSource::Knn).await.unwrap() {
        Enrichment::Generated { model, text } => {
            assert_eq!(model, "backup");
            assert_eq!(text, "Details from backup");
        }
        Enrichment::Offline => panic!("Expected generated enrichment"),
    }
}

#[tokio::test]
async fn test_empty_model_list_is_rejected() {
    let config = EnrichmentConfig {
        models: vec![],
        ..Default::default()
    };
    assert!(matches!(
        Enricher::from_config(&config, Some("key".to_string())),
        Err(EnrichmentError::NoModels)
    ));
}

// =============================================================================
// Accept through the router with a remote enricher
// =============================================================================

fn app_with(enricher: Enricher) -> Router {
    let dataset = Dataset::new(TRAINING_DATASET, Arc::new(KeyValueStore::in_memory()));
    build_router(AppState::new(
        DecisionPolicy::default(),
        dataset,
        enricher,
        EventBus::new(100),
    ))
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_accept_runs_cascade() {
    let (endpoint, api) = start_fake_api(&[("busy", 429)]).await;
    let app = app_with(Enricher::Remote(client(&endpoint, &["busy", "ready"])));

    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Red Wine", "confidences": {"Red Wine": 0.92}}),
    )
    .await;

    let (status, body) = post_json(&app, "/api/decision", json!({"decision": "accept"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "enriched");
    let html = body["result_html"].as_str().unwrap();
    assert!(html.contains("Details from ready"));
    assert!(html.contains("Red Wine"));
    assert_eq!(*api.calls.lock().unwrap(), vec!["busy", "ready"]);
}

#[tokio::test]
async fn test_blocked_accept_never_calls_endpoint() {
    let (endpoint, api) = start_fake_api(&[]).await;
    let app = app_with(Enricher::Remote(client(&endpoint, &["model"])));

    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Beer", "confidences": {"Beer": 0.3}}),
    )
    .await;

    let (_, body) = post_json(&app, "/api/decision", json!({"decision": "accept"})).await;
    assert_eq!(body["outcome"], "blocked");
    assert!(api.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_accept_reports_cascade_failure() {
    let (endpoint, _api) = start_fake_api(&[("a", 503), ("b", 503)]).await;
    let app = app_with(Enricher::Remote(client(&endpoint, &["a", "b"])));

    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Gin", "confidences": {"Gin": 0.8}}),
    )
    .await;

    let (status, body) = post_json(&app, "/api/decision", json!({"decision": "accept"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "enrichment_failed");
    assert!(body["result_html"].as_str().unwrap().contains("a (HTTP 503)"));
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_retry_during_slow_accept_discards_stale_details() {
    let (endpoint, api) =
        start_fake_api_with_delay(&[], Some(Duration::from_millis(500))).await;
    let app = app_with(Enricher::Remote(client(&endpoint, &["slow"])));

    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Rum", "confidences": {"Rum": 0.9}}),
    )
    .await;

    let accept_app = app.clone();
    let accept = tokio::spawn(async move {
        post_json(&accept_app, "/api/decision", json!({"decision": "accept"})).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let (status, body) = post_json(&app, "/api/decision", json!({"decision": "retry"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "retry");

    let (status, body) = accept.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    assert_eq!(api.calls.lock().unwrap().len(), 1);

    let session = get_json(&app, "/api/session").await;
    assert_eq!(session["current_page"], "identify");
    assert_eq!(session["user_decision"], "retry");
    assert_eq!(session["result_panel"], "");
    assert!(session["latest_prediction"].is_null());
}

#[tokio::test]
async fn test_new_prediction_during_slow_accept_discards_stale_details() {
    let (endpoint, _api) =
        start_fake_api_with_delay(&[], Some(Duration::from_millis(500))).await;
    let app = app_with(Enricher::Remote(client(&endpoint, &["slow"])));

    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Rum", "confidences": {"Rum": 0.9}}),
    )
    .await;

    let accept_app = app.clone();
    let accept = tokio::spawn(async move {
        post_json(&accept_app, "/api/decision", json!({"decision": "accept"})).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    post_json(
        &app,
        "/api/predictions",
        json!({"source": "knn", "label": "Gin", "confidences": {"Gin": 0.95}}),
    )
    .await;

    let (status, _) = accept.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);

    let session = get_json(&app, "/api/session").await;
    assert_eq!(session["latest_prediction"]["prediction"]["label"], "Gin");
    assert_eq!(session["result_panel"], "");
    assert!(session["user_decision"].is_null());
}
