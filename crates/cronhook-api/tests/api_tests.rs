//! REST surface tests: the router wired to an in-memory store and a
//! live engine, driven through tower's oneshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono_tz::Tz;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use cronhook_api::{router, ApiContext, TriggerRateLimiter};
use cronhook_core::config::RetentionConfig;
use cronhook_database::{DatabasePool, JobRepository, LogRepository, Migrator};
use cronhook_scheduler::{RetentionSweeper, SchedulerEngine};

async fn test_app() -> (Router, ApiContext) {
    let pool = DatabasePool::connect_in_memory().await.unwrap();
    Migrator::run(&pool).await.unwrap();
    let jobs = JobRepository::new(pool.clone());
    let logs = LogRepository::new(pool.clone());

    let ctx = ApiContext {
        engine: SchedulerEngine::new(jobs.clone(), logs.clone(), Tz::UTC),
        sweeper: RetentionSweeper::new(logs.clone(), RetentionConfig::default(), Tz::UTC),
        jobs,
        logs,
        limiter: Arc::new(TriggerRateLimiter::new()),
        timezone: Tz::UTC,
    };
    (router(ctx.clone()), ctx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sample_job_body(name: &str) -> Value {
    json!({
        "name": name,
        "url": "https://api.example.com/ping",
        "method": "GET",
        "schedule": "5m",
        "scheduleType": "repeat",
        "isActive": false
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn create_and_fetch_job() {
    let (app, _ctx) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", sample_job_body("ping")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["name"], "ping");
    assert_eq!(created["scheduleType"], "repeat");
    assert_eq!(created["executionMode"], "sequential");
    assert_eq!(created["maxConcurrent"], 1);
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/jobs/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request("GET", "/api/jobs"))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_too_fast_repeat() {
    let (app, _ctx) = test_app().await;

    let mut body = sample_job_body("too-fast");
    body["schedule"] = json!("3s");

    let response = app
        .oneshot(json_request("POST", "/api/jobs", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("Minimum interval is 5 seconds"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_is_404() {
    let (app, _ctx) = test_app().await;
    let response = app
        .oneshot(empty_request(
            "GET",
            "/api/jobs/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn toggle_twice_restores_is_active() {
    let (app, _ctx) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", sample_job_body("flip")))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["isActive"], false);

    let response = app
        .clone()
        .oneshot(empty_request("PUT", &format!("/api/jobs/{id}/toggle")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["isActive"], true);

    let response = app
        .clone()
        .oneshot(empty_request("PUT", &format!("/api/jobs/{id}/toggle")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["isActive"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_changes_schedule() {
    let (app, _ctx) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", sample_job_body("edit")))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/jobs/{id}"),
            json!({"schedule": "0 * * * *", "scheduleType": "cron"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["schedule"], "0 * * * *");
    assert_eq!(updated["scheduleType"], "cron");

    // Invalid updates are rejected
    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/jobs/{id}"),
            json!({"schedule": "bogus"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn trigger_is_rate_limited_per_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (app, _ctx) = test_app().await;

    let mut body = sample_job_body("manual");
    body["url"] = json!(format!("{}/hook", server.uri()));
    body["isActive"] = json!(true);
    // Far-future cron keeps the timer quiet during the test
    body["schedule"] = json!("0 0 1 1 *");
    body["scheduleType"] = json!("cron");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", body))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/jobs/{id}/trigger")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let log = body_json(response).await;
    assert_eq!(log["triggeredManually"], true);
    assert_eq!(log["status"], "success");

    // Second trigger inside the 10s window
    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/jobs/{id}/trigger")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let error = body_json(response).await;
    let retry_after: f64 = error["details"]["retryAfter"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0.0 && retry_after <= 10.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn trigger_unknown_and_inactive() {
    let (app, _ctx) = test_app().await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "POST",
            "/api/jobs/00000000-0000-0000-0000-000000000000/trigger",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", sample_job_body("off")))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(empty_request("POST", &format!("/api/jobs/{id}/trigger")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn export_import_round_trip_preserves_identity() {
    let (app, ctx) = test_app().await;

    let mut body = sample_job_body("exported");
    body["tagNames"] = json!(["ops", "billing"]);
    body["headers"] = json!(r#"{"X-Key": "v"}"#);
    body["executionMode"] = json!("parallel");
    body["maxConcurrent"] = json!(4);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", body))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/data/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let export = body_json(response).await;
    assert_eq!(export["metadata"]["counts"]["cronJobs"], 1);
    assert_eq!(export["metadata"]["version"], "1.0");

    // Wipe and import the snapshot back
    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/jobs/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/data/import", export.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["imported"], 1);
    assert_eq!(summary["skipped"], 0);

    let restored = ctx.jobs.list().await.unwrap();
    assert_eq!(restored.len(), 1);
    let job = &restored[0];
    assert_eq!(job.name, "exported");
    assert_eq!(job.max_concurrent, 4);
    assert_eq!(job.headers.as_deref(), Some(r#"{"X-Key": "v"}"#));
    let tags = ctx.jobs.tag_names(job.id).await.unwrap();
    assert_eq!(tags, vec!["billing", "ops"]);

    // Exporting again yields the same identity set
    let response = app
        .oneshot(empty_request("GET", "/api/data/export"))
        .await
        .unwrap();
    let second = body_json(response).await;
    assert_eq!(second["data"]["cronJobs"], export["data"]["cronJobs"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_reports_broken_entries() {
    let (app, _ctx) = test_app().await;

    let payload = json!({
        "metadata": {
            "exportedAt": "2024-01-01T00:00:00Z",
            "version": "1.0",
            "counts": {"cronJobs": 1, "tags": 0}
        },
        "data": {
            "cronJobs": [{
                "name": "broken",
                "url": "not-a-url",
                "method": "GET",
                "schedule": "3s",
                "scheduleType": "repeat",
                "isActive": true,
                "executionMode": "sequential",
                "maxConcurrent": 1
            }],
            "tags": []
        }
    });

    let response = app
        .oneshot(json_request("POST", "/api/data/validate", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["valid"], false);
    assert_eq!(report["jobCount"], 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn job_logs_paginate_with_defaults() {
    let (app, ctx) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/jobs", sample_job_body("logged")))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();
    let job_id = uuid::Uuid::parse_str(&id).unwrap();

    for i in 0..25u64 {
        ctx.logs
            .insert(&cronhook_core::model::ExecutionLog {
                id: uuid::Uuid::new_v4(),
                job_id,
                executed_at: chrono::Utc::now(),
                status: if i % 2 == 0 {
                    cronhook_core::model::ExecutionStatus::Success
                } else {
                    cronhook_core::model::ExecutionStatus::Failed
                },
                response_code: Some(200),
                execution_time: i,
                response_body: None,
                error_message: None,
                triggered_manually: false,
            })
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/jobs/{id}/logs")))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["meta"]["limit"], 20);
    assert_eq!(page["meta"]["total"], 25);
    assert_eq!(page["data"].as_array().unwrap().len(), 20);

    let response = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/jobs/{id}/logs?status=failed&limit=200"),
        ))
        .await
        .unwrap();
    let page = body_json(response).await;
    // Limit is clamped to 100; only the 12 failed rows match
    assert_eq!(page["meta"]["limit"], 100);
    assert_eq!(page["meta"]["total"], 12);

    let response = app
        .oneshot(empty_request("GET", "/api/logs/stats"))
        .await
        .unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["overall"]["total"], 25);
    assert_eq!(stats["overall"]["success"], 13);
}
