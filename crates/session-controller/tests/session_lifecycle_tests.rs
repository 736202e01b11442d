//! Integration tests for the session lifecycle service.
//!
//! Covers:
//! - Create saga: remote-first, compensation on local failure
//! - Ownership and integration preconditions
//! - Edits: validation before any provider call, remote-before-local
//! - State machine: cancel, complete, terminal states

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use common::types::{CourseId, SessionId};
use sc_test_utils::{fixed_instant, TestServices, TestSession};
use session_controller::errors::ScError;
use session_controller::models::{SessionPatch, SessionStatus};
use session_controller::repositories::SessionStore;
use session_controller::services::meeting_provider::mock::MockMeetingProvider;
use std::time::Duration;

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_session_persists_remote_meeting() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;

    let session = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, classroom.create_request())
        .await?;

    assert_eq!(session.mentor_id, classroom.mentor.user_id);
    assert_eq!(session.status, SessionStatus::Scheduled);
    assert_eq!(session.scheduled_start, fixed_instant(10));
    assert!(session.scheduled_end > session.scheduled_start);
    assert_eq!(
        services.provider.created_ids(),
        vec![session.external_meeting_id.clone()]
    );

    let stored = classroom.store.get_session(session.id).await?.unwrap();
    assert_eq!(stored, session);
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_leaves_no_session() -> Result<()> {
    let services = TestServices::with_provider(MockMeetingProvider::failing());
    let classroom = &services.classroom;

    let err = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, classroom.create_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::ProviderFailure(_)));
    assert_eq!(classroom.store.session_count()?, 0);
    assert_eq!(services.provider.cancel_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_cancels_remote_meeting_once() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    classroom.store.set_fail_session_writes(true);

    let err = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, classroom.create_request())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");
    assert_eq!(services.provider.create_calls(), 1);
    assert_eq!(services.provider.cancel_calls(), 1);
    assert_eq!(
        services.provider.cancelled_ids(),
        services.provider.created_ids()
    );
    assert_eq!(classroom.store.session_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn test_compensation_survives_dropped_caller() -> Result<()> {
    let services = TestServices::with_provider(
        MockMeetingProvider::accepting().with_cancel_delay(Duration::from_millis(200)),
    );
    let classroom = &services.classroom;
    classroom.store.set_fail_session_writes(true);

    // Give up on the request while the compensating cancel is still in flight.
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        services
            .state
            .lifecycle
            .create_session(&classroom.mentor, classroom.create_request()),
    )
    .await;
    assert!(outcome.is_err(), "request should still be compensating");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(services.provider.cancel_calls(), 1);
    assert_eq!(
        services.provider.cancelled_ids(),
        services.provider.created_ids()
    );
    Ok(())
}

#[tokio::test]
async fn test_create_requires_course_ownership() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;

    let err = services
        .state
        .lifecycle
        .create_session(&classroom.other_mentor(), classroom.create_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::AccessDenied(_)));

    let mut request = classroom.create_request();
    request.course_id = CourseId::new();
    let err = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, request)
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::AccessDenied(_)));

    assert_eq!(services.provider.create_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_create_requires_integration() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;

    // A second course owned by a mentor with no integration.
    let mentor = classroom.other_mentor();
    let course_id = CourseId::new();
    classroom.store.add_course(course_id, mentor.user_id)?;
    let mut request = classroom.create_request();
    request.course_id = course_id;

    let err = services
        .state
        .lifecycle
        .create_session(&mentor, request)
        .await
        .unwrap_err();

    assert_eq!(err, ScError::IntegrationRequired);
    assert_eq!(services.provider.create_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_create_rejects_inverted_window() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let mut request = classroom.create_request();
    request.scheduled_end = request.scheduled_start - ChronoDuration::minutes(1);

    let err = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, request)
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::Validation(_)));
    assert_eq!(services.provider.create_calls(), 0);
    Ok(())
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_start_moved_past_end_is_rejected_before_provider() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = services
        .state
        .lifecycle
        .create_session(&classroom.mentor, classroom.create_request())
        .await?;

    let patch = SessionPatch {
        scheduled_start: Some(fixed_instant(14)),
        ..Default::default()
    };
    let err = services
        .state
        .lifecycle
        .update_session(&classroom.mentor, session.id, patch)
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::Validation(_)));
    assert_eq!(services.provider.update_calls(), 0);
    let stored = classroom.store.get_session(session.id).await?.unwrap();
    assert_eq!(stored.scheduled_start, fixed_instant(10));
    Ok(())
}

#[tokio::test]
async fn test_remote_update_failure_leaves_row_unchanged() -> Result<()> {
    let services = TestServices::with_provider(MockMeetingProvider::failing_update());
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let patch = SessionPatch {
        title: Some("Renamed".to_string()),
        ..Default::default()
    };
    let err = services
        .state
        .lifecycle
        .update_session(&classroom.mentor, session.id, patch)
        .await
        .unwrap_err();

    assert!(matches!(err, ScError::ProviderFailure(_)));
    assert_eq!(services.provider.update_calls(), 1);
    let stored = classroom.store.get_session(session.id).await?.unwrap();
    assert_eq!(stored.title, session.title);
    Ok(())
}

#[tokio::test]
async fn test_local_only_edit_skips_provider() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let patch = SessionPatch {
        max_participants: Some(3),
        qa_enabled: Some(false),
        ..Default::default()
    };
    let updated = services
        .state
        .lifecycle
        .update_session(&classroom.mentor, session.id, patch)
        .await?;

    assert_eq!(updated.max_participants, 3);
    assert!(!updated.qa_enabled);
    assert_eq!(services.provider.update_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_update_by_non_owner_looks_like_missing() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let foreign = services
        .state
        .lifecycle
        .update_session(&classroom.other_mentor(), session.id, SessionPatch::default())
        .await
        .unwrap_err();
    let missing = services
        .state
        .lifecycle
        .update_session(&classroom.mentor, SessionId::new(), SessionPatch::default())
        .await
        .unwrap_err();

    assert_eq!(foreign, missing);
    assert_eq!(foreign.error_code(), "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_status_patch_follows_state_machine() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let err = services
        .state
        .lifecycle
        .update_session(
            &classroom.mentor,
            session.id,
            SessionPatch {
                status: Some(SessionStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::Validation(_)));

    let cancelled = services
        .state
        .lifecycle
        .update_session(
            &classroom.mentor,
            session.id,
            SessionPatch {
                status: Some(SessionStatus::Cancelled),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(
        services.provider.cancelled_ids(),
        vec![session.external_meeting_id.clone()]
    );
    Ok(())
}

// ============================================================================
// Cancel / complete
// ============================================================================

#[tokio::test]
async fn test_cancel_is_idempotent_and_keeps_row() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let first = services
        .state
        .lifecycle
        .cancel_session(&classroom.mentor, session.id)
        .await?;
    let second = services
        .state
        .lifecycle
        .cancel_session(&classroom.mentor, session.id)
        .await?;

    assert_eq!(first.status, SessionStatus::Cancelled);
    assert_eq!(second.status, SessionStatus::Cancelled);
    assert_eq!(services.provider.cancel_calls(), 1);
    assert!(classroom.store.get_session(session.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_remote_cancel_failure_keeps_local_cancel() -> Result<()> {
    let services = TestServices::with_provider(MockMeetingProvider::failing_cancel());
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;

    let cancelled = services
        .state
        .lifecycle
        .cancel_session(&classroom.mentor, session.id)
        .await?;

    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(services.provider.cancel_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_complete_requires_live() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::live_now()).await;

    let err = services
        .state
        .lifecycle
        .complete_session(&classroom.mentor, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::Validation(_)));

    let student = classroom.enroll_student();
    services.state.admission.join(&student, session.id).await?;

    let completed = services
        .state
        .lifecycle
        .complete_session(&classroom.mentor, session.id)
        .await?;
    assert_eq!(completed.status, SessionStatus::Completed);
    assert!(completed.actual_end.is_some());

    let err = services
        .state
        .lifecycle
        .cancel_session(&classroom.mentor, session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::SessionUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_get_session_visibility() -> Result<()> {
    let services = TestServices::new();
    let classroom = &services.classroom;
    let session = classroom.seed_session(TestSession::upcoming()).await;
    let student = classroom.enroll_student();

    let lifecycle = &services.state.lifecycle;
    assert_eq!(
        lifecycle.get_session(&classroom.mentor, session.id).await?.id,
        session.id
    );
    assert_eq!(lifecycle.get_session(&student, session.id).await?.id, session.id);

    let err = lifecycle
        .get_session(&classroom.outsider(), session.id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
    Ok(())
}
