//! In-memory session store.
//!
//! Used by the test suites and by the binary when no `DATABASE_URL` is set.
//! All state lives behind one mutex, so every trait method is atomic with
//! respect to every other.

use super::SessionStore;
use crate::errors::ScError;
use crate::models::{
    Admission, Attendance, AttendanceStatus, ChatMessage, NewSession, Poll, PollResponse,
    ProviderCredentials, Question, QuestionStatus, Session, SessionStatus,
};
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{CourseId, SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    courses: HashMap<CourseId, UserId>,
    enrollments: HashSet<(CourseId, UserId)>,
    integrations: HashMap<UserId, SecretString>,
    sessions: HashMap<SessionId, Session>,
    attendance: HashMap<(SessionId, UserId), Attendance>,
    chat: Vec<ChatMessage>,
    questions: HashMap<Uuid, Question>,
    polls: HashMap<Uuid, Poll>,
    poll_responses: HashMap<(Uuid, UserId), PollResponse>,
}

/// Session store held entirely in process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: Mutex<State>,
    fail_session_writes: AtomicBool,
    fail_chat_writes: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ScError> {
        self.state
            .lock()
            .map_err(|_| ScError::Internal("in-memory store lock poisoned".to_string()))
    }

    // --- seeding -------------------------------------------------------------

    /// Register a course owned by `mentor_id`.
    pub fn add_course(&self, course_id: CourseId, mentor_id: UserId) -> Result<(), ScError> {
        self.lock()?.courses.insert(course_id, mentor_id);
        Ok(())
    }

    /// Give `student_id` an active enrollment in `course_id`.
    pub fn enroll(&self, course_id: CourseId, student_id: UserId) -> Result<(), ScError> {
        self.lock()?.enrollments.insert((course_id, student_id));
        Ok(())
    }

    /// Deactivate an enrollment.
    pub fn unenroll(&self, course_id: CourseId, student_id: UserId) -> Result<(), ScError> {
        self.lock()?.enrollments.remove(&(course_id, student_id));
        Ok(())
    }

    /// Connect a provider account for `mentor_id`.
    pub fn add_integration(&self, mentor_id: UserId, access_token: &str) -> Result<(), ScError> {
        self.lock()?
            .integrations
            .insert(mentor_id, SecretString::from(access_token));
        Ok(())
    }

    // --- failure injection ---------------------------------------------------

    /// Make session inserts and updates fail with `PersistenceFailure`.
    pub fn set_fail_session_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::SeqCst);
    }

    /// Make chat, question and poll writes fail with `PersistenceFailure`.
    pub fn set_fail_chat_writes(&self, fail: bool) {
        self.fail_chat_writes.store(fail, Ordering::SeqCst);
    }

    fn check_session_writes(&self) -> Result<(), ScError> {
        if self.fail_session_writes.load(Ordering::SeqCst) {
            return Err(ScError::PersistenceFailure(
                "injected session write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn check_chat_writes(&self) -> Result<(), ScError> {
        if self.fail_chat_writes.load(Ordering::SeqCst) {
            return Err(ScError::PersistenceFailure(
                "injected chat write failure".to_string(),
            ));
        }
        Ok(())
    }

    // --- inspection ----------------------------------------------------------

    /// Number of persisted sessions.
    pub fn session_count(&self) -> Result<usize, ScError> {
        Ok(self.lock()?.sessions.len())
    }

    /// Number of attendance rows for a session, in any status.
    pub fn attendance_rows(&self, session_id: SessionId) -> Result<usize, ScError> {
        Ok(self
            .lock()?
            .attendance
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .count())
    }

    /// Chat messages of a session in insertion order.
    pub fn chat_messages(&self, session_id: SessionId) -> Result<Vec<ChatMessage>, ScError> {
        Ok(self
            .lock()?
            .chat
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn ping(&self) -> Result<(), ScError> {
        self.lock().map(|_| ())
    }

    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, ScError> {
        Ok(self.lock()?.courses.get(&course_id).copied())
    }

    async fn has_active_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, ScError> {
        Ok(self.lock()?.enrollments.contains(&(course_id, student_id)))
    }

    async fn provider_credentials(
        &self,
        mentor_id: UserId,
    ) -> Result<Option<ProviderCredentials>, ScError> {
        Ok(self
            .lock()?
            .integrations
            .get(&mentor_id)
            .map(|token| ProviderCredentials {
                mentor_id,
                access_token: token.clone(),
            }))
    }

    async fn insert_session(&self, new: &NewSession) -> Result<Session, ScError> {
        self.check_session_writes()?;
        let mut state = self.lock()?;
        if state.sessions.contains_key(&new.id) {
            return Err(ScError::PersistenceFailure(
                "duplicate session id".to_string(),
            ));
        }

        let now = Utc::now();
        let session = Session {
            id: new.id,
            course_id: new.course_id,
            mentor_id: new.mentor_id,
            title: new.title.clone(),
            description: new.description.clone(),
            scheduled_start: new.scheduled_start,
            scheduled_end: new.scheduled_end,
            actual_start: None,
            actual_end: None,
            meeting_link: new.meeting_link.clone(),
            external_meeting_id: new.external_meeting_id.clone(),
            max_participants: new.max_participants,
            status: SessionStatus::Scheduled,
            chat_enabled: new.chat_enabled,
            qa_enabled: new.qa_enabled,
            polls_enabled: new.polls_enabled,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, ScError> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn update_session(
        &self,
        session: &Session,
        expected_status: SessionStatus,
    ) -> Result<Option<Session>, ScError> {
        self.check_session_writes()?;
        let mut state = self.lock()?;
        let Some(current) = state.sessions.get_mut(&session.id) else {
            return Ok(None);
        };
        if current.mentor_id != session.mentor_id || current.status != expected_status {
            return Ok(None);
        }

        current.title = session.title.clone();
        current.description = session.description.clone();
        current.scheduled_start = session.scheduled_start;
        current.scheduled_end = session.scheduled_end;
        current.max_participants = session.max_participants;
        current.chat_enabled = session.chat_enabled;
        current.qa_enabled = session.qa_enabled;
        current.polls_enabled = session.polls_enabled;
        current.updated_at = Utc::now();
        Ok(Some(current.clone()))
    }

    async fn transition_status(
        &self,
        session_id: SessionId,
        from: &[SessionStatus],
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>, ScError> {
        self.check_session_writes()?;
        let mut state = self.lock()?;
        let Some(current) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !from.contains(&current.status) {
            return Ok(None);
        }

        current.status = to;
        match to {
            SessionStatus::Live => current.actual_start = Some(at),
            SessionStatus::Completed => current.actual_end = Some(at),
            _ => {}
        }
        current.updated_at = at;
        Ok(Some(current.clone()))
    }

    async fn admit_attendee(
        &self,
        session_id: SessionId,
        student_id: UserId,
        max_participants: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ScError> {
        let mut state = self.lock()?;
        let key = (session_id, student_id);

        if let Some(existing) = state.attendance.get_mut(&key) {
            if existing.status == AttendanceStatus::Joined {
                existing.updated_at = now;
                return Ok(Admission::AlreadyJoined(existing.clone()));
            }
        }

        let joined = state
            .attendance
            .values()
            .filter(|a| a.session_id == session_id && a.status == AttendanceStatus::Joined)
            .count();
        if joined >= usize::try_from(max_participants).unwrap_or(0) {
            return Ok(Admission::Full);
        }

        let attendance = match state.attendance.get(&key) {
            Some(previous) => Attendance {
                status: AttendanceStatus::Joined,
                joined_at: Some(now),
                left_at: None,
                updated_at: now,
                ..previous.clone()
            },
            None => Attendance {
                session_id,
                student_id,
                status: AttendanceStatus::Joined,
                joined_at: Some(now),
                left_at: None,
                duration_seconds: 0,
                updated_at: now,
            },
        };
        state.attendance.insert(key, attendance.clone());
        Ok(Admission::Admitted(attendance))
    }

    async fn count_joined(&self, session_id: SessionId) -> Result<i64, ScError> {
        let count = self
            .lock()?
            .attendance
            .values()
            .filter(|a| a.session_id == session_id && a.status == AttendanceStatus::Joined)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn mark_left(
        &self,
        session_id: SessionId,
        student_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>, ScError> {
        let mut state = self.lock()?;
        let Some(existing) = state.attendance.get_mut(&(session_id, student_id)) else {
            return Ok(None);
        };
        if existing.status != AttendanceStatus::Joined {
            return Ok(None);
        }
        *existing = existing.leave_at(now);
        Ok(Some(existing.clone()))
    }

    async fn list_attendance(&self, session_id: SessionId) -> Result<Vec<Attendance>, ScError> {
        let mut rows: Vec<Attendance> = self
            .lock()?
            .attendance
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.joined_at, a.student_id));
        Ok(rows)
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), ScError> {
        self.check_chat_writes()?;
        self.lock()?.chat.push(message.clone());
        Ok(())
    }

    async fn get_chat_message(
        &self,
        session_id: SessionId,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, ScError> {
        Ok(self
            .lock()?
            .chat
            .iter()
            .find(|m| m.id == message_id && m.session_id == session_id)
            .cloned())
    }

    async fn insert_question(&self, question: &Question) -> Result<(), ScError> {
        self.check_chat_writes()?;
        self.lock()?.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
    ) -> Result<Option<Question>, ScError> {
        Ok(self
            .lock()?
            .questions
            .get(&question_id)
            .filter(|q| q.session_id == session_id)
            .cloned())
    }

    async fn answer_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
        answer: &str,
        answered_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Question>, ScError> {
        self.check_chat_writes()?;
        let mut state = self.lock()?;
        let Some(question) = state
            .questions
            .get_mut(&question_id)
            .filter(|q| q.session_id == session_id && q.status == QuestionStatus::Pending)
        else {
            return Ok(None);
        };

        question.status = QuestionStatus::Answered;
        question.answer = Some(answer.to_string());
        question.answered_by = Some(answered_by);
        question.answered_at = Some(at);
        Ok(Some(question.clone()))
    }

    async fn insert_poll(&self, poll: &Poll) -> Result<(), ScError> {
        self.check_chat_writes()?;
        self.lock()?.polls.insert(poll.id, poll.clone());
        Ok(())
    }

    async fn get_poll(
        &self,
        session_id: SessionId,
        poll_id: Uuid,
    ) -> Result<Option<Poll>, ScError> {
        Ok(self
            .lock()?
            .polls
            .get(&poll_id)
            .filter(|p| p.session_id == session_id)
            .cloned())
    }

    async fn close_poll(
        &self,
        session_id: SessionId,
        poll_id: Uuid,
    ) -> Result<Option<Poll>, ScError> {
        self.check_chat_writes()?;
        let mut state = self.lock()?;
        let Some(poll) = state
            .polls
            .get_mut(&poll_id)
            .filter(|p| p.session_id == session_id)
        else {
            return Ok(None);
        };
        poll.is_active = false;
        Ok(Some(poll.clone()))
    }

    async fn upsert_poll_response(
        &self,
        response: &PollResponse,
    ) -> Result<PollResponse, ScError> {
        self.check_chat_writes()?;
        self.lock()?
            .poll_responses
            .insert((response.poll_id, response.user_id), response.clone());
        Ok(response.clone())
    }

    async fn list_poll_responses(&self, poll_id: Uuid) -> Result<Vec<PollResponse>, ScError> {
        let mut rows: Vec<PollResponse> = self
            .lock()?
            .poll_responses
            .values()
            .filter(|r| r.poll_id == poll_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.submitted_at);
        Ok(rows)
    }
}
