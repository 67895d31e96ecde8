//! Router-level tests: one-shot requests through the full axum stack.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use memorai::engine::MemoryEngine;
use memorai::gateway::{AppState, MEMORAI_STATUS_HEADER, create_router_with_state};
use memorai::ratelimit::{RateRule, RateScope};

async fn app() -> (Router, Arc<MemoryEngine<memorai::index::InMemoryIndex>>) {
    let engine = Arc::new(MemoryEngine::new_mock().await);
    let router = create_router_with_state(AppState::new(Arc::clone(&engine)));
    (router, engine)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let tier_header = response
        .headers()
        .get(MEMORAI_STATUS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value, tier_header)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_healthz_reports_tier_state() {
    let (router, _engine) = app().await;
    let (status, body, _) = send(&router, get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "mock");
    assert_eq!(body["active_tier"], "mock");
}

#[tokio::test]
async fn test_ready_when_serving() {
    let (router, _engine) = app().await;
    let (status, body, _) = send(&router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_remember_then_recall_over_http() {
    let (router, _engine) = app().await;

    let (status, body, tier) = send(
        &router,
        post(
            "/v1/memory/remember",
            json!({
                "content": "User prefers dark mode",
                "tenant_id": "t1",
                "agent_id": "a1",
                "kind": "preference",
                "importance": 0.7
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tier.as_deref(), Some("mock"));
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body, _) = send(
        &router,
        post(
            "/v1/memory/recall",
            json!({
                "text": "User prefers dark mode",
                "tenant_id": "t1",
                "agent_id": "a1",
                "k": 5
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let memories = body["memories"].as_array().unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0]["record"]["id"], id.as_str());
    assert!(memories[0]["score"].as_f64().unwrap() >= 0.5);
}

#[tokio::test]
async fn test_validation_error_body_shape() {
    let (router, _engine) = app().await;

    let (status, body, tier) = send(
        &router,
        post(
            "/v1/memory/remember",
            json!({
                "content": "   ",
                "tenant_id": "t1",
                "agent_id": "a1"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("invalid input"));
    assert!(body["at"].is_string());
    assert_eq!(tier.as_deref(), Some("invalid_input"));
}

#[tokio::test]
async fn test_forget_by_id_over_http() {
    let (router, _engine) = app().await;

    let (_, body, _) = send(
        &router,
        post(
            "/v1/memory/remember",
            json!({"content": "ephemeral", "tenant_id": "t1", "agent_id": "a1"}),
        ),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body, _) = send(
        &router,
        post(
            "/v1/memory/forget",
            json!({"tenant_id": "t1", "id": id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 1);
    assert_eq!(body["failed_ids"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_forget_rejects_ambiguous_body() {
    let (router, _engine) = app().await;

    let (status, body, _) = send(&router, post("/v1/memory/forget", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_forget_by_query_requires_confirm_flag() {
    let (router, _engine) = app().await;

    let (status, body, _) = send(
        &router,
        post(
            "/v1/memory/forget",
            json!({"query": {"text": "anything", "tenant_id": "t1"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("confirmation"));
}

#[tokio::test]
async fn test_context_over_http() {
    let (router, _engine) = app().await;

    send(
        &router,
        post(
            "/v1/memory/remember",
            json!({
                "content": "Standup is at 09:30",
                "tenant_id": "t1",
                "agent_id": "a1",
                "kind": "thread",
                "tags": ["meetings"]
            }),
        ),
    )
    .await;

    let (status, body, _) = send(
        &router,
        post(
            "/v1/memory/context",
            json!({
                "tenant_id": "t1",
                "agent_id": "a1",
                "summary_kind": "brief"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memories"].as_array().unwrap().len(), 1);
    assert!(body["summary"].as_str().unwrap().contains("1 memories"));
}

#[tokio::test]
async fn test_rate_limited_surfaces_429_with_details() {
    let (router, engine) = app().await;
    engine.limiter().set_rule(
        RateScope::Tenant("busy".to_string()),
        RateRule::throttle(1, Duration::from_secs(60)),
    );

    let recall = || {
        post(
            "/v1/memory/recall",
            json!({"text": "hello", "tenant_id": "busy", "k": 3}),
        )
    };

    let (status, _, _) = send(&router, recall()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, tier) = send(&router, recall()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
    assert!(body["details"]["reset_at"].is_string());
    assert_eq!(body["details"]["limit_type"], "tenant");
    assert_eq!(tier.as_deref(), Some("rate_limited"));
}

#[tokio::test]
async fn test_stats_and_list_endpoints() {
    let (router, _engine) = app().await;

    for i in 0..3 {
        send(
            &router,
            post(
                "/v1/memory/remember",
                json!({
                    "content": format!("memory {i}"),
                    "tenant_id": "t1",
                    "agent_id": "a1"
                }),
            ),
        )
        .await;
    }

    let (status, body, _) = send(&router, get("/v1/memory/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_records"], 3);

    let (status, body, _) = send(
        &router,
        get("/v1/memory/list?tenant_id=t1&agent_id=a1&limit=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().unwrap().len(), 2);
    assert!(body["next_cursor"].is_string());
}

#[tokio::test]
async fn test_tier_endpoints() {
    let (router, _engine) = app().await;

    let (status, body, _) = send(&router, get("/v1/tier")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], "mock");
    assert_eq!(body["capabilities"]["offline"], true);

    let (status, body, _) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/v1/tier/reprobe")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], "mock");
}

#[tokio::test]
async fn test_request_id_header_is_accepted() {
    let (router, _engine) = app().await;

    let mut request = post(
        "/v1/memory/remember",
        json!({"content": "traced", "tenant_id": "t1", "agent_id": "a1"}),
    );
    request
        .headers_mut()
        .insert("x-request-id", "req-12345".parse().unwrap());

    let (status, body, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].is_string());
}
