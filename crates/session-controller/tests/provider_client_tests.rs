//! HTTP client tests for the meeting provider and identity verifier.
//!
//! Both clients talk to a mocked upstream so request shape and status
//! mapping can be checked without the real services.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::secret::SecretString;
use common::types::{Role, UserId};
use serde_json::json;
use session_controller::errors::ScError;
use session_controller::models::ProviderCredentials;
use session_controller::services::meeting_provider::{MeetingRequest, MeetingUpdate};
use session_controller::services::{
    HttpIdentityVerifier, HttpMeetingProvider, IdentityVerifier, MeetingProvider,
};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> ProviderCredentials {
    ProviderCredentials {
        mentor_id: UserId::new(),
        access_token: SecretString::from("mentor-access-token"),
    }
}

fn provider(server: &MockServer) -> HttpMeetingProvider {
    HttpMeetingProvider::new(server.uri(), Duration::from_secs(2)).unwrap()
}

fn meeting_request() -> MeetingRequest {
    let start = Utc.with_ymd_and_hms(2024, 12, 15, 10, 0, 0).unwrap();
    MeetingRequest {
        title: "Lifetimes in practice".to_string(),
        description: "Q&A included".to_string(),
        start,
        end: start + ChronoDuration::hours(1),
        attendee_emails: vec!["student@example.com".to_string()],
    }
}

// ============================================================================
// Meeting provider
// ============================================================================

#[tokio::test]
async fn test_create_meeting_sends_bearer_and_parses_meeting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/meetings"))
        .and(header("Authorization", "Bearer mentor-access-token"))
        .and(body_partial_json(json!({
            "title": "Lifetimes in practice",
            "attendees": [{"email": "student@example.com"}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ext-42",
            "join_url": "https://meet.example.com/ext-42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = provider(&server)
        .create_meeting(&credentials(), &meeting_request())
        .await
        .unwrap();

    assert_eq!(created.external_meeting_id, "ext-42");
    assert_eq!(created.join_link, "https://meet.example.com/ext-42");
}

#[tokio::test]
async fn test_create_meeting_maps_rejection_to_provider_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/meetings"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad window"))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_meeting(&credentials(), &meeting_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::ProviderFailure(_)));
}

#[tokio::test]
async fn test_create_meeting_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_meeting(&credentials(), &meeting_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::ProviderFailure(_)));
}

#[tokio::test]
async fn test_update_meeting_sends_only_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/meetings/ext-42"))
        .and(body_partial_json(json!({"title": "Renamed"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let update = MeetingUpdate {
        title: Some("Renamed".to_string()),
        ..Default::default()
    };
    provider(&server)
        .update_meeting(&credentials(), "ext-42", &update)
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("start_time").is_none());
    assert!(body.get("end_time").is_none());
}

#[tokio::test]
async fn test_cancel_meeting_treats_missing_as_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/meetings/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/meetings/ext-42"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = provider(&server);
    assert!(client.cancel_meeting(&credentials(), "gone").await.is_ok());
    assert!(client.cancel_meeting(&credentials(), "ext-42").await.is_ok());
}

#[tokio::test]
async fn test_meeting_id_is_a_single_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/meetings/team%2Fa%3Fb"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    provider(&server)
        .cancel_meeting(&credentials(), "team/a?b")
        .await
        .unwrap();
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let err = HttpMeetingProvider::new("not a url".to_string(), Duration::from_secs(2))
        .err()
        .unwrap();
    assert!(matches!(err, ScError::Internal(_)));
}

#[tokio::test]
async fn test_cancel_meeting_server_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/meetings/ext-42"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = provider(&server)
        .cancel_meeting(&credentials(), "ext-42")
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::ProviderFailure(_)));
}

#[tokio::test]
async fn test_resolve_join_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/meetings/ext-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ext-42",
            "join_url": "https://meet.example.com/fresh"
        })))
        .mount(&server)
        .await;

    let link = provider(&server)
        .resolve_join_link(&credentials(), "ext-42")
        .await
        .unwrap();
    assert_eq!(link, "https://meet.example.com/fresh");
}

#[tokio::test]
async fn test_provider_timeout_is_provider_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/meetings"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = HttpMeetingProvider::new(server.uri(), Duration::from_millis(100)).unwrap();
    let err = client
        .create_meeting(&credentials(), &meeting_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::ProviderFailure(_)));
}

// ============================================================================
// Identity verifier
// ============================================================================

fn verifier(server: &MockServer) -> HttpIdentityVerifier {
    HttpIdentityVerifier::new(format!("{}/v1/verify", server.uri()), Duration::from_secs(2))
        .unwrap()
}

#[tokio::test]
async fn test_verifier_accepts_valid_token() {
    let server = MockServer::start().await;
    let user_id = UserId::new();
    Mock::given(method("POST"))
        .and(path("/v1/verify"))
        .and(body_partial_json(json!({"token": "good"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": user_id,
            "role": "mentor"
        })))
        .mount(&server)
        .await;

    let identity = verifier(&server).verify("good").await.unwrap();
    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.role, Role::Mentor);
}

#[tokio::test]
async fn test_verifier_rejected_token_is_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/verify"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = verifier(&server).verify("expired").await.unwrap_err();
    assert!(matches!(err, ScError::Unauthenticated(_)));
}

#[tokio::test]
async fn test_verifier_outage_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/verify"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = verifier(&server).verify("good").await.unwrap_err();
    assert!(matches!(err, ScError::ServiceUnavailable(_)));
}
