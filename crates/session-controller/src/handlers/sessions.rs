//! Session handlers.
//!
//! - `POST /v1/sessions` - Schedule a session (mentor)
//! - `GET /v1/sessions/{id}` - Read a session (mentor or enrolled student)
//! - `PATCH /v1/sessions/{id}` - Edit a session (owning mentor)
//! - `DELETE /v1/sessions/{id}` - Cancel a session (owning mentor)
//! - `POST /v1/sessions/{id}/complete` - End a live session (owning mentor)
//! - `POST /v1/sessions/{id}/join` - Join as a student
//! - `POST /v1/sessions/{id}/leave` - Leave as a student
//! - `GET /v1/sessions/{id}/attendance` - Roster (owning mentor)
//!
//! Path and body parsing failures are reported as `VALIDATION_ERROR` with
//! the same error body as every other rejection.

use crate::errors::ScError;
use crate::models::{
    Attendance, CreateSessionRequest, JoinResponse, LeaveResponse, Session, SessionPatch,
};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::{Identity, SessionId};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::instrument;

pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId, ScError> {
    raw.parse()
        .map_err(|_| ScError::Validation("Invalid session id".to_string()))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ScError> {
    serde_json::from_slice(body)
        .map_err(|e| ScError::Validation(format!("Invalid request body: {e}")))
}

// ============================================================================
// Handler: POST /v1/sessions
// ============================================================================

/// Schedule a session.
///
/// # Response
///
/// - 201 Created: the persisted session
/// - 400 Bad Request: malformed body, title, window or capacity
/// - 403 Forbidden: caller does not own the course
/// - 412 Precondition Failed: no meeting provider integration
/// - 502 Bad Gateway: provider rejected the meeting
/// - 500 Internal Server Error: local write failed (remote meeting cancelled)
#[instrument(skip_all, name = "sc.handlers.create_session", fields(user_id = %identity.user_id))]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<(StatusCode, Json<Session>), ScError> {
    let request: CreateSessionRequest = parse_body(&body)?;
    let session = state.lifecycle.create_session(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

// ============================================================================
// Handler: GET /v1/sessions/{id}
// ============================================================================

#[instrument(skip_all, name = "sc.handlers.get_session", fields(session_id = %id))]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ScError> {
    let session_id = parse_session_id(&id)?;
    let session = state.lifecycle.get_session(&identity, session_id).await?;
    Ok(Json(session))
}

// ============================================================================
// Handler: PATCH /v1/sessions/{id}
// ============================================================================

/// Edit a session. Absent fields are unchanged.
///
/// # Response
///
/// - 200 OK: the updated session
/// - 400 Bad Request: invalid fields, window or status transition
/// - 404 Not Found: session missing or not owned by the caller
/// - 409 Conflict: session ended or changed concurrently
/// - 502 Bad Gateway: provider update failed; nothing was changed
#[instrument(skip_all, name = "sc.handlers.update_session", fields(session_id = %id))]
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Session>, ScError> {
    let session_id = parse_session_id(&id)?;
    let patch: SessionPatch = parse_body(&body)?;
    let session = state
        .lifecycle
        .update_session(&identity, session_id, patch)
        .await?;
    Ok(Json(session))
}

// ============================================================================
// Handler: DELETE /v1/sessions/{id}
// ============================================================================

/// Cancel a session. The row is kept with status `cancelled`.
#[instrument(skip_all, name = "sc.handlers.cancel_session", fields(session_id = %id))]
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ScError> {
    let session_id = parse_session_id(&id)?;
    let session = state.lifecycle.cancel_session(&identity, session_id).await?;
    Ok(Json(session))
}

#[instrument(skip_all, name = "sc.handlers.complete_session", fields(session_id = %id))]
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ScError> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .lifecycle
        .complete_session(&identity, session_id)
        .await?;
    Ok(Json(session))
}

// ============================================================================
// Handlers: attendance
// ============================================================================

/// Join a session.
///
/// # Response
///
/// - 200 OK: attendance record and meeting join link
/// - 403 Forbidden: `NOT_ENROLLED` or caller is not a student
/// - 409 Conflict: `SESSION_UNAVAILABLE` or `CAPACITY_EXCEEDED`
#[instrument(skip_all, name = "sc.handlers.join_session", fields(session_id = %id))]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<JoinResponse>, ScError> {
    let session_id = parse_session_id(&id)?;
    let response = state.admission.join(&identity, session_id).await?;
    Ok(Json(response))
}

#[instrument(skip_all, name = "sc.handlers.leave_session", fields(session_id = %id))]
pub async fn leave_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<LeaveResponse>, ScError> {
    let session_id = parse_session_id(&id)?;
    let response = state.admission.leave(&identity, session_id).await?;
    Ok(Json(response))
}

#[instrument(skip_all, name = "sc.handlers.list_attendance", fields(session_id = %id))]
pub async fn list_attendance(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Attendance>>, ScError> {
    let session_id = parse_session_id(&id)?;
    let roster = state.admission.roster(&identity, session_id).await?;
    Ok(Json(roster))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_id() {
        let id = SessionId::new();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_session_id("not-a-uuid"),
            Err(ScError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_body_rejects_malformed_json() {
        let body = Bytes::from_static(b"{\"title\":");
        let result: Result<SessionPatch, ScError> = parse_body(&body);
        assert_eq!(result.unwrap_err().error_code(), "VALIDATION_ERROR");
    }
}
