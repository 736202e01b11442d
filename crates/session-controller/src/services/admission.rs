//! Attendance admission controller.
//!
//! Join requests for one session are serialized behind a per-session async
//! mutex, and the store's `admit_attendee` makes the count-then-write
//! capacity decision atomically as well. Joins for different sessions never
//! share a lock.
//!
//! Gates, in order, each with its own error:
//! 1. session exists and is not terminal (`SessionUnavailable`)
//! 2. active enrollment in the session's course (`NotEnrolled`)
//! 3. joined count below `max_participants` (`CapacityExceeded`)

use super::lifecycle::load_owned_session;
use super::meeting_provider::MeetingProvider;
use crate::actors::RoomRegistryHandle;
use crate::errors::ScError;
use crate::models::{Admission, Attendance, JoinResponse, LeaveResponse, Session, SessionStatus};
use crate::observability::metrics;
use crate::repositories::SessionStore;
use chrono::Utc;
use common::types::{Identity, Role, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, instrument, warn};

type SessionLock = tokio::sync::Mutex<()>;

/// Admission control for live sessions.
pub struct AdmissionController {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn MeetingProvider>,
    rooms: RoomRegistryHandle,
    /// Per-session serialization points. Entries die with their last user.
    locks: Mutex<HashMap<SessionId, Weak<SessionLock>>>,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn MeetingProvider>,
        rooms: RoomRegistryHandle,
    ) -> Self {
        Self {
            store,
            provider,
            rooms,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a student into a session.
    ///
    /// Re-joining while already joined refreshes the existing record and does
    /// not consume a second slot. The first join at or after the scheduled
    /// start moves the session to `live`. If the join link cannot be resolved
    /// the student stays admitted and `meeting_link` is `None`.
    ///
    /// # Errors
    ///
    /// - `ScError::AccessDenied` - caller is not a student
    /// - `ScError::SessionUnavailable` - session missing, completed or cancelled
    /// - `ScError::NotEnrolled` - no active enrollment in the course
    /// - `ScError::CapacityExceeded` - session is full
    #[instrument(
        skip_all,
        name = "sc.services.admission.join",
        fields(session_id = %session_id, student_id = %caller.user_id)
    )]
    pub async fn join(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<JoinResponse, ScError> {
        if caller.role != Role::Student {
            return Err(ScError::AccessDenied(
                "Only students can join sessions".to_string(),
            ));
        }

        let result = self.admit(caller, session_id).await;
        let (attendance, session, went_live) = match result {
            Ok(admitted) => admitted,
            Err(e) => {
                metrics::record_admission(rejection_outcome(&e));
                return Err(e);
            }
        };

        if went_live {
            if let Err(e) = self.rooms.session_updated(session.clone()).await {
                warn!(
                    target: "sc.services.admission",
                    session_id = %session.id,
                    error = %e,
                    "Failed to notify room of session start"
                );
            }
        }

        // The admission is committed at this point, so a link failure must not
        // turn into a join error.
        let meeting_link = match self.join_link(&session).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(
                    target: "sc.services.admission",
                    session_id = %session.id,
                    error = %e,
                    "Admitted without a join link"
                );
                None
            }
        };
        Ok(JoinResponse {
            attendance,
            meeting_link,
            session_status: session.status,
        })
    }

    /// The serialized part of `join`. Returns the attendance, the (possibly
    /// transitioned) session and whether this join started the session.
    async fn admit(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<(Attendance, Session, bool), ScError> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;
        let now = Utc::now();

        let session = self
            .store
            .get_session(session_id)
            .await?
            .filter(|session| !session.status.is_terminal())
            .ok_or_else(|| {
                ScError::SessionUnavailable("Session not found or has ended".to_string())
            })?;

        if !self
            .store
            .has_active_enrollment(session.course_id, caller.user_id)
            .await?
        {
            return Err(ScError::NotEnrolled);
        }

        let attendance = match self
            .store
            .admit_attendee(session.id, caller.user_id, session.max_participants, now)
            .await?
        {
            Admission::Admitted(attendance) => {
                metrics::record_admission("admitted");
                info!(
                    target: "sc.services.admission",
                    session_id = %session.id,
                    student_id = %caller.user_id,
                    "Student admitted"
                );
                attendance
            }
            Admission::AlreadyJoined(attendance) => {
                metrics::record_admission("already_joined");
                debug!(
                    target: "sc.services.admission",
                    session_id = %session.id,
                    student_id = %caller.user_id,
                    "Student already joined"
                );
                attendance
            }
            Admission::Full => return Err(ScError::CapacityExceeded),
        };

        if session.status == SessionStatus::Scheduled && now >= session.scheduled_start {
            let live = self
                .store
                .transition_status(session.id, &[SessionStatus::Scheduled], SessionStatus::Live, now)
                .await?;
            if let Some(live) = live {
                info!(
                    target: "sc.services.admission",
                    session_id = %live.id,
                    "Session is live"
                );
                return Ok((attendance, live, true));
            }
        }

        Ok((attendance, session, false))
    }

    /// Mark the caller's attendance as left. No active attendance is a no-op.
    #[instrument(
        skip_all,
        name = "sc.services.admission.leave",
        fields(session_id = %session_id, user_id = %caller.user_id)
    )]
    pub async fn leave(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<LeaveResponse, ScError> {
        let lock = self.session_lock(session_id)?;
        let _guard = lock.lock().await;

        let attendance = self
            .store
            .mark_left(session_id, caller.user_id, Utc::now())
            .await?;
        if let Some(attendance) = &attendance {
            debug!(
                target: "sc.services.admission",
                session_id = %session_id,
                duration_seconds = attendance.duration_seconds,
                "Student left"
            );
        }
        Ok(LeaveResponse { attendance })
    }

    /// Attendance roster for the owning mentor.
    #[instrument(skip_all, name = "sc.services.admission.roster", fields(session_id = %session_id))]
    pub async fn roster(
        &self,
        caller: &Identity,
        session_id: SessionId,
    ) -> Result<Vec<Attendance>, ScError> {
        let session = load_owned_session(self.store.as_ref(), caller, session_id).await?;
        self.store.list_attendance(session.id).await
    }

    /// Join link for a session, asking the provider when none is stored.
    async fn join_link(&self, session: &Session) -> Result<String, ScError> {
        if !session.meeting_link.is_empty() {
            return Ok(session.meeting_link.clone());
        }
        let credentials = self
            .store
            .provider_credentials(session.mentor_id)
            .await?
            .ok_or(ScError::IntegrationRequired)?;
        self.provider
            .resolve_join_link(&credentials, &session.external_meeting_id)
            .await
    }

    fn session_lock(&self, session_id: SessionId) -> Result<Arc<SessionLock>, ScError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| ScError::Internal(format!("admission lock table poisoned: {e}")))?;

        if let Some(lock) = locks.get(&session_id).and_then(Weak::upgrade) {
            return Ok(lock);
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(SessionLock::new(()));
        locks.insert(session_id, Arc::downgrade(&lock));
        Ok(lock)
    }
}

fn rejection_outcome(error: &ScError) -> &'static str {
    match error {
        ScError::SessionUnavailable(_) => "session_unavailable",
        ScError::NotEnrolled => "not_enrolled",
        ScError::CapacityExceeded => "capacity_exceeded",
        _ => "error",
    }
}
