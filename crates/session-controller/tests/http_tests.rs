//! HTTP surface tests.
//!
//! Drives the production router with `tower::ServiceExt::oneshot` over the
//! in-memory stack: authentication, status codes and error bodies.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::config::DEFAULT_LOG_FILTER;
use common::types::{Identity, SessionId};
use http_body_util::BodyExt;
use sc_test_utils::{fixed_instant, TestServices, TestSession};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

async fn send(
    router: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builder should succeed"),
        None => builder
            .body(Body::empty())
            .expect("request builder should succeed"),
    };

    let response = router.oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

fn create_body(services: &TestServices) -> Value {
    json!({
        "course_id": services.classroom.course_id,
        "title": "  Traits and generics  ",
        "scheduled_start": fixed_instant(10),
        "scheduled_end": fixed_instant(11),
        "max_participants": 10
    })
}

fn bearer(services: &TestServices, identity: &Identity) -> String {
    services.token_for(identity)
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let services = TestServices::new();
    let (status, body) = send(services.router(), Method::GET, "/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_renders_prometheus_text() {
    let services = TestServices::new();
    let router = services.router();
    send(router.clone(), Method::GET, "/v1/health", None, None).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .expect("request builder should succeed"),
        )
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sc_http_requests_total"));
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let services = TestServices::new();
    let router = services.router();
    let session_path = format!("/v1/sessions/{}", SessionId::new());

    for (method, uri) in [
        (Method::POST, "/v1/sessions".to_string()),
        (Method::GET, session_path.clone()),
        (Method::GET, format!("{session_path}/ws")),
    ] {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request builder should succeed"),
            )
            .await
            .expect("request should succeed");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn test_socket_query_token_is_not_logged() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::live_now()).await;
    let token = bearer(&services, &classroom.enroll_student());

    let response = services
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/sessions/{}/ws?access_token={token}", session.id))
                .body(Body::empty())
                .expect("request builder should succeed"),
        )
        .await
        .expect("request should succeed");
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);

    let output = logs.contents();
    assert!(output.contains(&format!("/v1/sessions/{}/ws", session.id)));
    assert!(!output.contains(&token));
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let services = TestServices::new();
    let (status, body) = send(
        services.router(),
        Method::POST,
        "/v1/sessions",
        Some("forged"),
        Some(create_body(&services)),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHENTICATED");
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_create_session_returns_created() {
    let services = TestServices::new();
    let token = bearer(&services, &services.classroom.mentor);

    let (status, body) = send(
        services.router(),
        Method::POST,
        "/v1/sessions",
        Some(&token),
        Some(create_body(&services)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Traits and generics");
    assert_eq!(body["status"], "scheduled");
    assert!(body["chat_enabled"].as_bool().unwrap());
    assert!(body["meeting_link"]
        .as_str()
        .unwrap()
        .starts_with("https://meet.example.com/"));
}

#[tokio::test]
async fn test_create_session_error_statuses() {
    let services = TestServices::new();
    let mentor_token = bearer(&services, &services.classroom.mentor);
    let student_token = bearer(&services, &services.classroom.enroll_student());
    let router = services.router();

    let (status, body) = send(
        router.clone(),
        Method::POST,
        "/v1/sessions",
        Some(&mentor_token),
        Some(json!({"title": "missing everything"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let mut inverted = create_body(&services);
    inverted["scheduled_end"] = json!(fixed_instant(9));
    let (status, _) = send(
        router.clone(),
        Method::POST,
        "/v1/sessions",
        Some(&mentor_token),
        Some(inverted),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        router,
        Method::POST,
        "/v1/sessions",
        Some(&student_token),
        Some(create_body(&services)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_DENIED");
}

#[tokio::test]
async fn test_provider_failure_is_bad_gateway() {
    let services = TestServices::with_provider(
        session_controller::services::meeting_provider::mock::MockMeetingProvider::failing(),
    );
    let token = bearer(&services, &services.classroom.mentor);

    let (status, body) = send(
        services.router(),
        Method::POST,
        "/v1/sessions",
        Some(&token),
        Some(create_body(&services)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "PROVIDER_FAILURE");
    assert_eq!(body["error"]["message"], "Meeting provider request failed");
}

#[tokio::test]
async fn test_invalid_session_id_is_bad_request() {
    let services = TestServices::new();
    let token = bearer(&services, &services.classroom.mentor);

    let (status, body) = send(
        services.router(),
        Method::GET,
        "/v1/sessions/not-a-session",
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_update_and_cancel_over_http() {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;
    let token = bearer(&services, &classroom.mentor);
    let router = services.router();
    let uri = format!("/v1/sessions/{}", session.id);

    let (status, body) = send(
        router.clone(),
        Method::PATCH,
        &uri,
        Some(&token),
        Some(json!({"description": "Bring questions", "max_participants": 40})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Bring questions");
    assert_eq!(body["max_participants"], 40);

    let (status, body) = send(router.clone(), Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(
        router,
        Method::PATCH,
        &uri,
        Some(&token),
        Some(json!({"title": "Too late"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "SESSION_UNAVAILABLE");
}

#[tokio::test]
async fn test_foreign_session_is_not_found() {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;
    let outsider_token = bearer(&services, &classroom.outsider());

    let (status, body) = send(
        services.router(),
        Method::GET,
        &format!("/v1/sessions/{}", session.id),
        Some(&outsider_token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_join_leave_and_roster_over_http() {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::live_now().capacity(1)).await;
    let student_token = bearer(&services, &classroom.enroll_student());
    let late_token = bearer(&services, &classroom.enroll_student());
    let mentor_token = bearer(&services, &classroom.mentor);
    let router = services.router();
    let base = format!("/v1/sessions/{}", session.id);

    let (status, body) = send(
        router.clone(),
        Method::POST,
        &format!("{base}/join"),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendance"]["status"], "joined");
    assert_eq!(body["session_status"], "live");
    assert_eq!(body["meeting_link"], session.meeting_link);

    let (status, body) = send(
        router.clone(),
        Method::POST,
        &format!("{base}/join"),
        Some(&late_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CAPACITY_EXCEEDED");

    let (status, body) = send(
        router.clone(),
        Method::GET,
        &format!("{base}/attendance"),
        Some(&mentor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        router,
        Method::POST,
        &format!("{base}/leave"),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attendance"]["status"], "left");
}

#[tokio::test]
async fn test_unenrolled_join_is_forbidden() {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::live_now()).await;
    let token = bearer(&services, &classroom.outsider());

    let (status, body) = send(
        services.router(),
        Method::POST,
        &format!("/v1/sessions/{}/join", session.id),
        Some(&token),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "NOT_ENROLLED");
}
