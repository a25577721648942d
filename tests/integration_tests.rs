use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use throttler::clock::ManualClock;
use throttler::handlers::AppState;
use throttler::{create_app, PolicyResolver, RateLimitConfig, ThrottleOptions, Throttler};
use tower::ServiceExt;

const POLICIES: &str = r#"{
    "actions": {
        "POST /check": {"count": 3, "window": "1m", "error_text": "Only 3 checks per minute"}
    },
    "groups": {
        "/stats": {"count": 1, "window": "1s"}
    }
}"#;

fn app(clock: &ManualClock) -> Router {
    let resolver = PolicyResolver::new(RateLimitConfig::from_json(POLICIES).unwrap()).unwrap();
    let options = ThrottleOptions {
        default_error_text: "Slow down".to_string(),
        ..ThrottleOptions::default()
    };
    let throttler = Throttler::with_clock(options, resolver, Arc::new(clock.clone())).unwrap();
    create_app(AppState::new(throttler))
}

fn get(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

fn post_check(client: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/check")
        .header("x-forwarded-for", client)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let clock = ManualClock::default();
    let app = app(&clock);

    let response = app.oneshot(get("/health", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unthrottled_route_never_rejects() {
    let clock = ManualClock::default();
    let app = app(&clock);

    for _ in 0..20 {
        let response = app.clone().oneshot(get("/ready", "10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_route_quota_returns_429_with_policy_message() {
    let clock = ManualClock::default();
    let app = app(&clock);
    let payload = json!({"caller": "svc-a", "action": "GET /orders"});

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(post_check("10.0.0.1", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(post_check("10.0.0.1", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");

    let body = body_json(response).await;
    assert_eq!(body["error"], "too_many_requests");
    assert_eq!(body["message"], "Only 3 checks per minute");
    assert_eq!(body["code"], 429);

    // another client is counted separately
    let response = app
        .clone()
        .oneshot(post_check("10.0.0.2", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // and the first client gets through again once the window has passed
    clock.advance(Duration::from_secs(61));
    let response = app.oneshot(post_check("10.0.0.1", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_group_rule_uses_default_message() {
    let clock = ManualClock::default();
    let app = app(&clock);

    let response = app.clone().oneshot(get("/stats", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/stats", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Slow down");

    clock.advance(Duration::from_millis(1100));
    let response = app.oneshot(get("/stats", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_check_endpoint_decides_for_other_actions() {
    let clock = ManualClock::default();
    let resolver = PolicyResolver::new(
        RateLimitConfig::from_json(r#"{"actions": {"POST /login": {"count": 1, "window": "1m"}}}"#)
            .unwrap(),
    )
    .unwrap();
    let throttler =
        Throttler::with_clock(ThrottleOptions::default(), resolver, Arc::new(clock.clone()))
            .unwrap();
    let app = create_app(AppState::new(throttler));
    let payload = json!({"caller": "203.0.113.9", "action": "POST /login"});

    let response = app
        .clone()
        .oneshot(post_check("10.0.0.1", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["limit"], 1);

    let response = app
        .clone()
        .oneshot(post_check("10.0.0.1", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.oneshot(get("/stats", "10.0.0.1")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["counters"], 1);
    assert_eq!(body["metrics"]["admitted_requests"], 1);
    assert_eq!(body["metrics"]["rejected_requests"], 1);
}

#[tokio::test]
async fn test_check_endpoint_validates_payload() {
    let clock = ManualClock::default();
    let app = app(&clock);

    let response = app
        .oneshot(post_check("10.0.0.1", json!({"caller": "", "action": "login"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_unknown_route_is_not_throttled() {
    let clock = ManualClock::default();
    let app = app(&clock);

    let response = app.oneshot(get("/missing", "10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_endpoint_does_not_cache_client_actions() {
    let clock = ManualClock::default();
    let resolver = PolicyResolver::new(
        RateLimitConfig::from_json(r#"{"actions": {"POST /login": {"count": 1, "window": "1m"}}}"#)
            .unwrap(),
    )
    .unwrap();
    let throttler =
        Throttler::with_clock(ThrottleOptions::default(), resolver, Arc::new(clock.clone()))
            .unwrap();
    let app = create_app(AppState::new(throttler));

    for i in 0..200 {
        let payload = json!({"caller": "svc-a", "action": format!("GET /junk/{i}")});
        let response = app
            .clone()
            .oneshot(post_check("10.0.0.1", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["limit"], Value::Null);
    }

    let response = app.oneshot(get("/stats", "10.0.0.1")).await.unwrap();
    let body = body_json(response).await;
    // only the two routes hit: POST /check and GET /stats
    assert_eq!(body["memoized_actions"], 2);
    assert_eq!(body["counters"], 0);
}

#[tokio::test]
async fn test_check_endpoint_rejects_oversized_action() {
    let clock = ManualClock::default();
    let app = app(&clock);
    let action = format!("GET /{}", "a".repeat(600));

    let response = app
        .oneshot(post_check("10.0.0.1", json!({"caller": "svc-a", "action": action})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
