//! Tracker HTTP client tests against a local axum server.
//!
//! The server serves canned Jira-style payloads so the client's URL building,
//! authentication header, payload mapping and error mapping run for real.

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracker_sync::error::AppError;
use tracker_sync::models::EntityKind;
use tracker_sync::services::query_cache::CachePolicy;
use tracker_sync::services::{
    FetchParams, RemoteFetcher, RemoteSource, RetryPolicy, TrackerClient, TrackerClientConfig,
};

async fn search(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }

    let jql = query.get("jql").cloned().unwrap_or_default();
    if jql.contains("\"MISSING\"") {
        let message = "The value 'MISSING' does not exist for the field 'project'.";
        return (StatusCode::BAD_REQUEST, Json(json!({"errorMessages": [message]}))).into_response();
    }
    if jql.contains("statusCategory = Done") {
        return Json(json!({"issues": [], "total": 3})).into_response();
    }
    if query.get("maxResults").map(String::as_str) == Some("0") {
        return Json(json!({"issues": [], "total": 8})).into_response();
    }

    Json(json!({
        "total": 8,
        "issues": [
            {
                "id": "10001",
                "key": "CORE-1",
                "fields": {
                    "summary": "Crash on start",
                    "status": {"name": "To Do"},
                    "reporter": {"displayName": "Alice"},
                    "labels": ["bug"],
                    "created": "2024-01-15T10:30:00.000+0000"
                }
            },
            {
                "id": "10002",
                "key": "CORE-2",
                "fields": {"summary": "Docs", "created": "2024-01-16T10:30:00.000+0000"}
            }
        ]
    }))
    .into_response()
}

async fn project(Path(key): Path<String>) -> impl IntoResponse {
    if key != "CORE" {
        let body = json!({"errorMessages": ["No project could be found"]});
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    }
    Json(json!({
        "id": "10000",
        "key": "CORE",
        "name": "Core Platform",
        "lead": {"displayName": "Dana"}
    }))
    .into_response()
}

async fn unavailable() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream down")
}

/// Start the canned tracker and return its base URL.
async fn start_tracker() -> String {
    let app = Router::new()
        .route("/rest/api/2/search", get(search))
        .route("/rest/api/2/project/{key}", get(project))
        .route("/down/rest/api/2/search", get(unavailable));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, email: Option<&str>) -> TrackerClient {
    TrackerClient::new(TrackerClientConfig {
        base_url: base_url.to_string(),
        email: email.map(String::from),
        api_token: Some("token".to_string()),
        timeout_secs: 5,
    })
    .unwrap()
}

fn params(project_key: &str) -> FetchParams {
    FetchParams {
        project_key: project_key.to_string(),
        max_results: 50,
        proxy_url: None,
    }
}

#[tokio::test]
async fn test_fetch_issues_maps_payload() {
    let base = start_tracker().await;
    let client = client(&base, Some("dev@example.com"));

    let issues = client
        .fetch_entities(EntityKind::Issue, &params("CORE"))
        .await
        .unwrap();
    assert_eq!(issues.ids(), vec!["CORE-1", "CORE-2"]);

    let first = issues.get("CORE-1").unwrap();
    assert_eq!(first.str_field("title"), Some("Crash on start"));
    assert_eq!(first.str_field("status"), Some("To Do"));
    assert_eq!(first.str_field("reporter"), Some("Alice"));
    assert_eq!(first.created_at, 1_705_314_600);
}

#[tokio::test]
async fn test_fetch_project_and_stats() {
    let base = start_tracker().await;
    let client = client(&base, Some("dev@example.com"));

    let projects = client
        .fetch_entities(EntityKind::Project, &params("CORE"))
        .await
        .unwrap();
    assert_eq!(projects.ids(), vec!["CORE"]);
    assert_eq!(projects.get("CORE").unwrap().str_field("lead"), Some("Dana"));

    let stats = client.fetch_stats(&params("CORE")).await.unwrap();
    assert_eq!(stats.total_issues, 8);
    assert_eq!(stats.done_issues, 3);
}

#[tokio::test]
async fn test_error_mapping() {
    let base = start_tracker().await;

    // Bearer auth is rejected by the canned server.
    let err = client(&base, None)
        .fetch_entities(EntityKind::Issue, &params("CORE"))
        .await
        .unwrap_err();
    assert!(err.is_authentication());

    let client = client(&base, Some("dev@example.com"));
    let err = client
        .fetch_entities(EntityKind::Issue, &params("MISSING"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(400));
    assert!(err.to_string().contains("does not exist"));

    let err = client
        .fetch_entities(EntityKind::Project, &params("NOPE"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(!err.is_retryable());

    assert!(matches!(
        client.fetch_entities(EntityKind::Team, &params("CORE")).await,
        Err(AppError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_proxy_url_overrides_base_and_server_errors_are_retried() {
    let base = start_tracker().await;
    let client = Arc::new(client("http://127.0.0.1:9", Some("dev@example.com")));
    let fetcher = RemoteFetcher::new(
        client,
        RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(5),
        },
        CachePolicy::default(),
    );

    let via_proxy = FetchParams {
        proxy_url: Some(base.clone()),
        ..params("CORE")
    };
    let issues = fetcher.fetch(EntityKind::Issue, &via_proxy).await.unwrap();
    assert_eq!(issues.len(), 2);

    let down = FetchParams {
        proxy_url: Some(format!("{}/down", base)),
        ..params("CORE")
    };
    let err = fetcher.fetch(EntityKind::Issue, &down).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::RemoteFetchFailed {
            attempts: 3,
            status_code: Some(503),
            ..
        }
    ));
}
