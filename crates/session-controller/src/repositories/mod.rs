//! Session store gateway.
//!
//! The single source of truth for sessions, attendance, chat, Q&A and polls.
//! Services depend on the [`SessionStore`] trait; `PgSessionStore` backs
//! production and `InMemorySessionStore` backs tests and database-less runs.
//!
//! # Ordering guarantees
//!
//! - `update_session` and `transition_status` are conditional writes filtered
//!   on the expected current status, so a concurrent transition makes them
//!   return `None` instead of overwriting.
//! - `admit_attendee` makes the count-then-write capacity decision as one
//!   atomic step per session.
//! - `upsert_poll_response` keeps exactly one row per (poll, user).

pub mod memory;
pub mod postgres;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

use crate::errors::ScError;
use crate::models::{
    Admission, Attendance, ChatMessage, NewSession, Poll, PollResponse, ProviderCredentials,
    Question, Session, SessionStatus,
};
use chrono::{DateTime, Utc};
use common::types::{CourseId, SessionId, UserId};
use uuid::Uuid;

/// Persistence boundary for the live-session core.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Cheap connectivity check for health probes.
    async fn ping(&self) -> Result<(), ScError>;

    // --- external catalog (read-only) -------------------------------------

    /// Owning mentor of a course, or `None` when the course does not exist.
    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, ScError>;

    /// Whether the student holds an active enrollment in the course.
    async fn has_active_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, ScError>;

    /// The mentor's active meeting-provider integration, if any.
    async fn provider_credentials(
        &self,
        mentor_id: UserId,
    ) -> Result<Option<ProviderCredentials>, ScError>;

    // --- sessions -----------------------------------------------------------

    async fn insert_session(&self, session: &NewSession) -> Result<Session, ScError>;

    async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, ScError>;

    /// Overwrite the mutable fields of `session`, filtered on owner and
    /// `expected_status`. Returns `None` if the filter matched no row.
    async fn update_session(
        &self,
        session: &Session,
        expected_status: SessionStatus,
    ) -> Result<Option<Session>, ScError>;

    /// Move a session from any of `from` to `to`, stamping `actual_start`
    /// when entering `live` and `actual_end` when entering `completed`.
    async fn transition_status(
        &self,
        session_id: SessionId,
        from: &[SessionStatus],
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>, ScError>;

    // --- attendance ---------------------------------------------------------

    /// Atomically admit a student if the joined count is below
    /// `max_participants`. Re-admitting a `joined` student refreshes the
    /// existing row and never consumes a second slot.
    async fn admit_attendee(
        &self,
        session_id: SessionId,
        student_id: UserId,
        max_participants: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ScError>;

    /// Count attendance rows with status `joined`.
    async fn count_joined(&self, session_id: SessionId) -> Result<i64, ScError>;

    /// Mark a `joined` row as `left`. Returns `None` if no row was `joined`.
    async fn mark_left(
        &self,
        session_id: SessionId,
        student_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>, ScError>;

    async fn list_attendance(&self, session_id: SessionId) -> Result<Vec<Attendance>, ScError>;

    // --- chat / Q&A -----------------------------------------------------------

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), ScError>;

    async fn get_chat_message(
        &self,
        session_id: SessionId,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, ScError>;

    async fn insert_question(&self, question: &Question) -> Result<(), ScError>;

    async fn get_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
    ) -> Result<Option<Question>, ScError>;

    /// Answer a `pending` question. Returns `None` if it does not exist or
    /// is no longer pending.
    async fn answer_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
        answer: &str,
        answered_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Question>, ScError>;

    // --- polls ----------------------------------------------------------------

    async fn insert_poll(&self, poll: &Poll) -> Result<(), ScError>;

    async fn get_poll(&self, session_id: SessionId, poll_id: Uuid)
        -> Result<Option<Poll>, ScError>;

    /// Deactivate a poll. Returns `None` if it does not exist in the session.
    async fn close_poll(
        &self,
        session_id: SessionId,
        poll_id: Uuid,
    ) -> Result<Option<Poll>, ScError>;

    /// Insert or overwrite the response for (poll, user).
    async fn upsert_poll_response(&self, response: &PollResponse)
        -> Result<PollResponse, ScError>;

    async fn list_poll_responses(&self, poll_id: Uuid) -> Result<Vec<PollResponse>, ScError>;
}
