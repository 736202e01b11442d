//! Session lifecycle service.
//!
//! Creates sessions against the meeting provider, applies mentor edits and
//! drives the session state machine:
//!
//! ```text
//! scheduled ──► live ──► completed
//!     │          │
//!     └──────────┴──► cancelled
//! ```
//!
//! # Create saga
//!
//! 1. Create the remote meeting (a failure ends the request, nothing is stored)
//! 2. Persist the session row referencing the remote meeting
//! 3. If step 2 fails, cancel the remote meeting exactly once and report
//!    `PersistenceFailure`
//!
//! No lock is held across any provider call.

use super::meeting_provider::{CreatedMeeting, MeetingProvider, MeetingRequest, MeetingUpdate};
use super::SESSION_NOT_FOUND_OR_DENIED;
use crate::actors::RoomRegistryHandle;
use crate::errors::ScError;
use crate::models::{
    validate_window, CreateSessionRequest, NewSession, ProviderCredentials, Session,
    SessionPatch, SessionStatus,
};
use crate::observability::metrics;
use crate::repositories::SessionStore;
use chrono::Utc;
use common::types::{Identity, SessionId, UserId};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Lifecycle operations on sessions.
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn MeetingProvider>,
    rooms: RoomRegistryHandle,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn MeetingProvider>,
        rooms: RoomRegistryHandle,
    ) -> Self {
        Self {
            store,
            provider,
            rooms,
        }
    }

    /// Schedule a new session for a course the caller owns.
    ///
    /// # Errors
    ///
    /// - `ScError::AccessDenied` - caller is not a mentor, or the course does
    ///   not exist or belongs to another mentor
    /// - `ScError::Validation` - malformed title, window or capacity
    /// - `ScError::IntegrationRequired` - mentor has no provider integration
    /// - `ScError::ProviderFailure` - remote create failed; nothing stored
    /// - `ScError::PersistenceFailure` - local write failed; remote meeting
    ///   was cancelled
    #[instrument(
        skip_all,
        name = "sc.services.lifecycle.create",
        fields(mentor_id = %caller.user_id, course_id = %request.course_id)
    )]
    pub async fn create_session(
        &self,
        caller: &Identity,
        request: CreateSessionRequest,
    ) -> Result<Session, ScError> {
        if !caller.is_mentor() {
            return Err(ScError::AccessDenied(
                "Only mentors can schedule sessions".to_string(),
            ));
        }
        request
            .validate()
            .map_err(|reason| ScError::Validation(reason.to_string()))?;

        match self.store.course_owner(request.course_id).await? {
            Some(owner) if owner == caller.user_id => {}
            _ => {
                return Err(ScError::AccessDenied(
                    "Course not found or not owned by caller".to_string(),
                ));
            }
        }

        let credentials = self
            .store
            .provider_credentials(caller.user_id)
            .await?
            .ok_or(ScError::IntegrationRequired)?;

        let saga = CreateSessionSaga {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            credentials,
        };
        let result = saga.run(caller.user_id, &request).await;

        match &result {
            Ok(session) => {
                metrics::record_session_created("success");
                info!(
                    target: "sc.services.lifecycle",
                    session_id = %session.id,
                    external_meeting_id = %session.external_meeting_id,
                    "Session created"
                );
            }
            Err(ScError::ProviderFailure(_)) => metrics::record_session_created("provider_failure"),
            Err(_) => metrics::record_session_created("persistence_failure"),
        }
        result
    }

    /// Apply a mentor's edit.
    ///
    /// Title and time changes are pushed to the provider first; a provider
    /// failure leaves the local row untouched.
    ///
    /// # Errors
    ///
    /// - `ScError::NotFound` - session missing or not owned by the caller
    /// - `ScError::SessionUnavailable` - session already ended
    /// - `ScError::Validation` - invalid fields, window or status transition
    /// - `ScError::ProviderFailure` - remote update failed
    /// - `ScError::Conflict` - session changed concurrently
    #[instrument(
        skip_all,
        name = "sc.services.lifecycle.update",
        fields(session_id = %session_id, mentor_id = %caller.user_id)
    )]
    pub async fn update_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
        patch: SessionPatch,
    ) -> Result<Session, ScError> {
        let session = self.owned_session(caller, session_id).await?;

        if patch.status == Some(session.status) && !patch.changes_details() {
            return Ok(session);
        }
        if session.status.is_terminal() {
            return Err(ScError::SessionUnavailable(format!(
                "Session is {}",
                session.status
            )));
        }

        patch
            .validate()
            .map_err(|reason| ScError::Validation(reason.to_string()))?;
        if let Some(next) = patch.status {
            if next != session.status && !session.status.can_transition_to(next) {
                return Err(ScError::Validation(format!(
                    "Cannot change status from {} to {next}",
                    session.status
                )));
            }
        }

        let merged = patch.apply_to(&session);
        validate_window(merged.scheduled_start, merged.scheduled_end)
            .map_err(|reason| ScError::Validation(reason.to_string()))?;

        let mut current = session;
        if patch.changes_details() {
            if patch.touches_remote() {
                let credentials = self
                    .store
                    .provider_credentials(current.mentor_id)
                    .await?
                    .ok_or(ScError::IntegrationRequired)?;
                let update = MeetingUpdate {
                    title: patch.title.as_ref().map(|_| merged.title.clone()),
                    start: patch.scheduled_start,
                    end: patch.scheduled_end,
                };
                self.provider
                    .update_meeting(&credentials, &current.external_meeting_id, &update)
                    .await?;
            }

            current = self
                .store
                .update_session(&merged, current.status)
                .await?
                .ok_or_else(|| {
                    ScError::Conflict("Session was modified concurrently".to_string())
                })?;
        }

        if let Some(next) = patch.status.filter(|next| *next != current.status) {
            current = self.transition(current, next).await?;
        }

        self.notify_rooms(&current).await;
        Ok(current)
    }

    /// Cancel a session. Cancelling an already-cancelled session succeeds.
    ///
    /// The row is kept so attendance and chat history remain queryable.
    #[instrument(
        skip_all,
        name = "sc.services.lifecycle.cancel",
        fields(session_id = %session_id, mentor_id = %caller.user_id)
    )]
    pub async fn cancel_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<Session, ScError> {
        let session = self.owned_session(caller, session_id).await?;
        match session.status {
            SessionStatus::Cancelled => return Ok(session),
            SessionStatus::Completed => {
                return Err(ScError::SessionUnavailable(
                    "Completed sessions cannot be cancelled".to_string(),
                ));
            }
            SessionStatus::Scheduled | SessionStatus::Live => {}
        }

        let cancelled = self.transition(session, SessionStatus::Cancelled).await?;
        self.notify_rooms(&cancelled).await;
        Ok(cancelled)
    }

    /// End a live session.
    #[instrument(
        skip_all,
        name = "sc.services.lifecycle.complete",
        fields(session_id = %session_id, mentor_id = %caller.user_id)
    )]
    pub async fn complete_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<Session, ScError> {
        let session = self.owned_session(caller, session_id).await?;
        match session.status {
            SessionStatus::Completed => return Ok(session),
            SessionStatus::Cancelled => {
                return Err(ScError::SessionUnavailable(
                    "Session is cancelled".to_string(),
                ));
            }
            SessionStatus::Scheduled => {
                return Err(ScError::Validation(
                    "Only live sessions can be completed".to_string(),
                ));
            }
            SessionStatus::Live => {}
        }

        let completed = self.transition(session, SessionStatus::Completed).await?;
        self.notify_rooms(&completed).await;
        Ok(completed)
    }

    /// Read a session as its mentor or an enrolled student.
    #[instrument(skip_all, name = "sc.services.lifecycle.get", fields(session_id = %session_id))]
    pub async fn get_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<Session, ScError> {
        let not_found = || ScError::NotFound(SESSION_NOT_FOUND_OR_DENIED.to_string());
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(not_found)?;

        let visible = if caller.is_mentor() {
            session.mentor_id == caller.user_id
        } else {
            self.store
                .has_active_enrollment(session.course_id, caller.user_id)
                .await?
        };

        if visible {
            Ok(session)
        } else {
            Err(not_found())
        }
    }

    /// Load a session the caller owns. Missing and foreign sessions are
    /// indistinguishable to the caller.
    pub(crate) async fn owned_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<Session, ScError> {
        load_owned_session(self.store.as_ref(), caller, session_id).await
    }

    async fn transition(
        &self,
        session: Session,
        next: SessionStatus,
    ) -> Result<Session, ScError> {
        let updated = self
            .store
            .transition_status(session.id, &[session.status], next, Utc::now())
            .await?
            .ok_or_else(|| ScError::Conflict("Session was modified concurrently".to_string()))?;

        info!(
            target: "sc.services.lifecycle",
            session_id = %updated.id,
            from = %session.status,
            to = %updated.status,
            "Session status changed"
        );

        if updated.status == SessionStatus::Cancelled {
            self.cancel_remote(&updated).await;
        }
        Ok(updated)
    }

    /// Best-effort remote cancel after a local cancellation.
    async fn cancel_remote(&self, session: &Session) {
        let credentials = match self.store.provider_credentials(session.mentor_id).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                warn!(
                    target: "sc.services.lifecycle",
                    session_id = %session.id,
                    "No provider integration, remote meeting left in place"
                );
                return;
            }
            Err(e) => {
                warn!(
                    target: "sc.services.lifecycle",
                    session_id = %session.id,
                    error = %e,
                    "Could not load provider credentials for remote cancel"
                );
                return;
            }
        };

        if let Err(e) = self
            .provider
            .cancel_meeting(&credentials, &session.external_meeting_id)
            .await
        {
            warn!(
                target: "sc.services.lifecycle",
                session_id = %session.id,
                external_meeting_id = %session.external_meeting_id,
                error = %e,
                "Remote cancel failed, session remains cancelled"
            );
        }
    }

    async fn notify_rooms(&self, session: &Session) {
        if let Err(e) = self.rooms.session_updated(session.clone()).await {
            warn!(
                target: "sc.services.lifecycle",
                session_id = %session.id,
                error = %e,
                "Failed to notify room of session change"
            );
        }
    }
}

/// Shared ownership check for mentor-only operations.
pub(crate) async fn load_owned_session(
    store: &dyn SessionStore,
    caller: &Identity,
    session_id: SessionId,
) -> Result<Session, ScError> {
    store
        .get_session(session_id)
        .await?
        .filter(|session| caller.is_mentor() && session.mentor_id == caller.user_id)
        .ok_or_else(|| ScError::NotFound(SESSION_NOT_FOUND_OR_DENIED.to_string()))
}

/// Remote-first create with a compensating cancel.
struct CreateSessionSaga {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn MeetingProvider>,
    credentials: ProviderCredentials,
}

impl CreateSessionSaga {
    async fn run(
        self,
        mentor_id: UserId,
        request: &CreateSessionRequest,
    ) -> Result<Session, ScError> {
        let meeting = self.provision_remote(request).await?;

        match self.persist_local(mentor_id, request, &meeting).await {
            Ok(session) => Ok(session),
            Err(persist_error) => {
                error!(
                    target: "sc.services.lifecycle",
                    external_meeting_id = %meeting.external_meeting_id,
                    error = %persist_error,
                    "Session write failed after remote create, compensating"
                );
                self.compensate(meeting.external_meeting_id).await;
                Err(match persist_error {
                    ScError::PersistenceFailure(detail) => ScError::PersistenceFailure(detail),
                    other => ScError::PersistenceFailure(other.to_string()),
                })
            }
        }
    }

    async fn provision_remote(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedMeeting, ScError> {
        let meeting_request = MeetingRequest {
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            start: request.scheduled_start,
            end: request.scheduled_end,
            attendee_emails: request.attendee_emails.clone(),
        };
        self.provider
            .create_meeting(&self.credentials, &meeting_request)
            .await
            .map_err(|e| match e {
                ScError::ProviderFailure(detail) => ScError::ProviderFailure(detail),
                other => ScError::ProviderFailure(other.to_string()),
            })
    }

    async fn persist_local(
        &self,
        mentor_id: UserId,
        request: &CreateSessionRequest,
        meeting: &CreatedMeeting,
    ) -> Result<Session, ScError> {
        let new_session = NewSession {
            id: SessionId::new(),
            course_id: request.course_id,
            mentor_id,
            title: request.title.trim().to_string(),
            description: request.description.clone(),
            scheduled_start: request.scheduled_start,
            scheduled_end: request.scheduled_end,
            meeting_link: meeting.join_link.clone(),
            external_meeting_id: meeting.external_meeting_id.clone(),
            max_participants: request.max_participants,
            chat_enabled: request.chat_enabled,
            qa_enabled: request.qa_enabled,
            polls_enabled: request.polls_enabled,
        };
        self.store.insert_session(&new_session).await
    }

    /// Cancel the just-created remote meeting, exactly once.
    ///
    /// Runs on its own task so that dropping the caller's request does not
    /// abort a cancel already in flight.
    async fn compensate(self, external_meeting_id: String) {
        let provider = self.provider;
        let credentials = self.credentials;
        let task = tokio::spawn(async move {
            match provider
                .cancel_meeting(&credentials, &external_meeting_id)
                .await
            {
                Ok(()) => {
                    metrics::record_compensation("success");
                    info!(
                        target: "sc.services.lifecycle",
                        external_meeting_id = %external_meeting_id,
                        "Compensating cancel succeeded"
                    );
                }
                Err(e) => {
                    metrics::record_compensation("failure");
                    error!(
                        target: "sc.services.lifecycle",
                        external_meeting_id = %external_meeting_id,
                        error = %e,
                        "Compensating cancel failed, remote meeting needs manual reconciliation"
                    );
                }
            }
        });

        if let Err(e) = task.await {
            error!(
                target: "sc.services.lifecycle",
                error = %e,
                "Compensation task ended abnormally"
            );
        }
    }
}
