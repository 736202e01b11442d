//! PostgreSQL session store.
//!
//! # Concurrency
//!
//! - `admit_attendee` runs in a transaction that locks the session row with
//!   `SELECT ... FOR UPDATE`, so capacity checks for one session serialize in
//!   the database even across controller instances.
//! - Status writes carry the expected current status in their `WHERE` clause.
//! - All queries use parameterized statements.

use super::SessionStore;
use crate::errors::ScError;
use crate::models::{
    Admission, Attendance, ChatMessage, NewSession, Poll, PollAnswer, PollOption, PollResponse,
    ProviderCredentials, Question, Session, SessionStatus,
};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{CourseId, SessionId, UserId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, course_id, mentor_id, title, description, \
    scheduled_start, scheduled_end, actual_start, actual_end, meeting_link, \
    external_meeting_id, max_participants, status, chat_enabled, qa_enabled, \
    polls_enabled, created_at, updated_at";

const ATTENDANCE_COLUMNS: &str =
    "session_id, student_id, status, joined_at, left_at, duration_seconds, updated_at";

const QUESTION_COLUMNS: &str = "id, session_id, student_id, body, is_anonymous, status, \
    answer, answered_by, answered_at, created_at";

const POLL_COLUMNS: &str = "id, session_id, created_by, question, options, poll_type, \
    is_anonymous, is_active, ends_at, created_at";

/// Session store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Record the query outcome and convert the error.
fn observe<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, ScError> {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_db_query(operation, status, start.elapsed());
    result.map_err(ScError::from)
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip_all, name = "sc.repo.ping")]
    async fn ping(&self) -> Result<(), ScError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").execute(&self.pool).await;
        observe("ping", start, result).map(|_| ())
    }

    #[instrument(skip_all, name = "sc.repo.course_owner")]
    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, ScError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT mentor_id FROM courses WHERE id = $1")
            .bind(course_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        let row = observe("course_owner", start, result)?;
        Ok(row.map(|r| UserId::from_uuid(r.get("mentor_id"))))
    }

    #[instrument(skip_all, name = "sc.repo.has_active_enrollment")]
    async fn has_active_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<bool, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM enrollments
                WHERE course_id = $1 AND student_id = $2 AND status = 'active'
            ) AS enrolled
            "#,
        )
        .bind(course_id.as_uuid())
        .bind(student_id.as_uuid())
        .fetch_one(&self.pool)
        .await;
        let row = observe("has_active_enrollment", start, result)?;
        Ok(row.get("enrolled"))
    }

    #[instrument(skip_all, name = "sc.repo.provider_credentials")]
    async fn provider_credentials(
        &self,
        mentor_id: UserId,
    ) -> Result<Option<ProviderCredentials>, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            SELECT access_token FROM provider_integrations
            WHERE mentor_id = $1 AND is_active = true
            "#,
        )
        .bind(mentor_id.as_uuid())
        .fetch_optional(&self.pool)
        .await;
        let row = observe("provider_credentials", start, result)?;
        Ok(row.map(|r| ProviderCredentials {
            mentor_id,
            access_token: SecretString::from(r.get::<String, _>("access_token")),
        }))
    }

    #[instrument(skip_all, name = "sc.repo.insert_session")]
    async fn insert_session(&self, new: &NewSession) -> Result<Session, ScError> {
        let start = Instant::now();
        let query = format!(
            r#"
            INSERT INTO live_sessions (
                id, course_id, mentor_id, title, description,
                scheduled_start, scheduled_end, meeting_link, external_meeting_id,
                max_participants, status, chat_enabled, qa_enabled, polls_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'scheduled', $11, $12, $13)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(new.id.as_uuid()) // $1
            .bind(new.course_id.as_uuid()) // $2
            .bind(new.mentor_id.as_uuid()) // $3
            .bind(&new.title) // $4
            .bind(&new.description) // $5
            .bind(new.scheduled_start) // $6
            .bind(new.scheduled_end) // $7
            .bind(&new.meeting_link) // $8
            .bind(&new.external_meeting_id) // $9
            .bind(new.max_participants) // $10
            .bind(new.chat_enabled) // $11
            .bind(new.qa_enabled) // $12
            .bind(new.polls_enabled) // $13
            .fetch_one(&self.pool)
            .await;
        let row = observe("insert_session", start, result)?;
        map_row_to_session(&row)
    }

    #[instrument(skip_all, name = "sc.repo.get_session")]
    async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>, ScError> {
        let start = Instant::now();
        let query = format!("SELECT {SESSION_COLUMNS} FROM live_sessions WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        let row = observe("get_session", start, result)?;
        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.update_session")]
    async fn update_session(
        &self,
        session: &Session,
        expected_status: SessionStatus,
    ) -> Result<Option<Session>, ScError> {
        let start = Instant::now();
        let query = format!(
            r#"
            UPDATE live_sessions
            SET title = $3, description = $4, scheduled_start = $5, scheduled_end = $6,
                max_participants = $7, chat_enabled = $8, qa_enabled = $9,
                polls_enabled = $10, updated_at = NOW()
            WHERE id = $1 AND mentor_id = $2 AND status = $11
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(session.id.as_uuid()) // $1
            .bind(session.mentor_id.as_uuid()) // $2
            .bind(&session.title) // $3
            .bind(&session.description) // $4
            .bind(session.scheduled_start) // $5
            .bind(session.scheduled_end) // $6
            .bind(session.max_participants) // $7
            .bind(session.chat_enabled) // $8
            .bind(session.qa_enabled) // $9
            .bind(session.polls_enabled) // $10
            .bind(expected_status.as_str()) // $11
            .fetch_optional(&self.pool)
            .await;
        let row = observe("update_session", start, result)?;
        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.transition_status")]
    async fn transition_status(
        &self,
        session_id: SessionId,
        from: &[SessionStatus],
        to: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>, ScError> {
        let start = Instant::now();
        let from: Vec<&str> = from.iter().map(SessionStatus::as_str).collect();
        let query = format!(
            r#"
            UPDATE live_sessions
            SET status = $3,
                actual_start = CASE WHEN $3 = 'live' THEN $4 ELSE actual_start END,
                actual_end = CASE WHEN $3 = 'completed' THEN $4 ELSE actual_end END,
                updated_at = $4
            WHERE id = $1 AND status = ANY($2)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(session_id.as_uuid())
            .bind(&from)
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await;
        let row = observe("transition_status", start, result)?;
        row.as_ref().map(map_row_to_session).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.admit_attendee")]
    async fn admit_attendee(
        &self,
        session_id: SessionId,
        student_id: UserId,
        max_participants: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ScError> {
        let start = Instant::now();
        let outcome = admit_in_transaction(
            &self.pool,
            session_id,
            student_id,
            max_participants,
            now,
        )
        .await;
        observe("admit_attendee", start, outcome)?
    }

    #[instrument(skip_all, name = "sc.repo.count_joined")]
    async fn count_joined(&self, session_id: SessionId) -> Result<i64, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            "SELECT COUNT(*) AS joined FROM session_attendance \
             WHERE session_id = $1 AND status = 'joined'",
        )
        .bind(session_id.as_uuid())
        .fetch_one(&self.pool)
        .await;
        let row = observe("count_joined", start, result)?;
        Ok(row.get("joined"))
    }

    #[instrument(skip_all, name = "sc.repo.mark_left")]
    async fn mark_left(
        &self,
        session_id: SessionId,
        student_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>, ScError> {
        let start = Instant::now();
        let query = format!(
            r#"
            UPDATE session_attendance
            SET status = 'left',
                left_at = $3,
                duration_seconds = duration_seconds
                    + GREATEST(0, COALESCE(EXTRACT(EPOCH FROM ($3 - joined_at))::BIGINT, 0)),
                updated_at = $3
            WHERE session_id = $1 AND student_id = $2 AND status = 'joined'
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(session_id.as_uuid())
            .bind(student_id.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        let row = observe("mark_left", start, result)?;
        row.as_ref().map(map_row_to_attendance).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.list_attendance")]
    async fn list_attendance(&self, session_id: SessionId) -> Result<Vec<Attendance>, ScError> {
        let start = Instant::now();
        let query = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM session_attendance \
             WHERE session_id = $1 ORDER BY joined_at NULLS LAST, student_id"
        );
        let result = sqlx::query(&query)
            .bind(session_id.as_uuid())
            .fetch_all(&self.pool)
            .await;
        let rows = observe("list_attendance", start, result)?;
        rows.iter().map(map_row_to_attendance).collect()
    }

    #[instrument(skip_all, name = "sc.repo.insert_chat_message")]
    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO session_chat_messages (
                id, session_id, author_id, author_role, body, message_type,
                visibility, recipient_id, reply_to, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message.id)
        .bind(message.session_id.as_uuid())
        .bind(message.author_id.as_uuid())
        .bind(message.author_role.as_str())
        .bind(&message.body)
        .bind(message.message_type.as_str())
        .bind(message.visibility.as_str())
        .bind(message.recipient_id.map(|id| id.0))
        .bind(message.reply_to)
        .bind(message.created_at)
        .execute(&self.pool)
        .await;
        observe("insert_chat_message", start, result).map(|_| ())
    }

    #[instrument(skip_all, name = "sc.repo.get_chat_message")]
    async fn get_chat_message(
        &self,
        session_id: SessionId,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            SELECT id, session_id, author_id, author_role, body, message_type,
                   visibility, recipient_id, reply_to, created_at
            FROM session_chat_messages
            WHERE id = $1 AND session_id = $2
            "#,
        )
        .bind(message_id)
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await;
        let row = observe("get_chat_message", start, result)?;
        row.as_ref().map(map_row_to_chat_message).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.insert_question")]
    async fn insert_question(&self, question: &Question) -> Result<(), ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO session_questions (
                id, session_id, student_id, body, is_anonymous, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(question.id)
        .bind(question.session_id.as_uuid())
        .bind(question.student_id.as_uuid())
        .bind(&question.body)
        .bind(question.is_anonymous)
        .bind(question.status.as_str())
        .bind(question.created_at)
        .execute(&self.pool)
        .await;
        observe("insert_question", start, result).map(|_| ())
    }

    #[instrument(skip_all, name = "sc.repo.get_question")]
    async fn get_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
    ) -> Result<Option<Question>, ScError> {
        let start = Instant::now();
        let query = format!(
            "SELECT {QUESTION_COLUMNS} FROM session_questions WHERE id = $1 AND session_id = $2"
        );
        let result = sqlx::query(&query)
            .bind(question_id)
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        let row = observe("get_question", start, result)?;
        row.as_ref().map(map_row_to_question).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.answer_question")]
    async fn answer_question(
        &self,
        session_id: SessionId,
        question_id: Uuid,
        answer: &str,
        answered_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Question>, ScError> {
        let start = Instant::now();
        let query = format!(
            r#"
            UPDATE session_questions
            SET status = 'answered', answer = $3, answered_by = $4, answered_at = $5
            WHERE id = $1 AND session_id = $2 AND status = 'pending'
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(question_id)
            .bind(session_id.as_uuid())
            .bind(answer)
            .bind(answered_by.as_uuid())
            .bind(at)
            .fetch_optional(&self.pool)
            .await;
        let row = observe("answer_question", start, result)?;
        row.as_ref().map(map_row_to_question).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.insert_poll")]
    async fn insert_poll(&self, poll: &Poll) -> Result<(), ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO session_polls (
                id, session_id, created_by, question, options, poll_type,
                is_anonymous, is_active, ends_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(poll.id)
        .bind(poll.session_id.as_uuid())
        .bind(poll.created_by.as_uuid())
        .bind(&poll.question)
        .bind(Json(&poll.options))
        .bind(poll.poll_type.as_str())
        .bind(poll.is_anonymous)
        .bind(poll.is_active)
        .bind(poll.ends_at)
        .bind(poll.created_at)
        .execute(&self.pool)
        .await;
        observe("insert_poll", start, result).map(|_| ())
    }

    #[instrument(skip_all, name = "sc.repo.get_poll")]
    async fn get_poll(
        &self,
        session_id: SessionId,
        poll_id: Uuid,
    ) -> Result<Option<Poll>, ScError> {
        let start = Instant::now();
        let query =
            format!("SELECT {POLL_COLUMNS} FROM session_polls WHERE id = $1 AND session_id = $2");
        let result = sqlx::query(&query)
            .bind(poll_id)
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        let row = observe("get_poll", start, result)?;
        row.as_ref().map(map_row_to_poll).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.close_poll")]
    async fn close_poll(
        &self,
        session_id: SessionId,
        poll_id: Uuid,
    ) -> Result<Option<Poll>, ScError> {
        let start = Instant::now();
        let query = format!(
            r#"
            UPDATE session_polls SET is_active = false
            WHERE id = $1 AND session_id = $2
            RETURNING {POLL_COLUMNS}
            "#
        );
        let result = sqlx::query(&query)
            .bind(poll_id)
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        let row = observe("close_poll", start, result)?;
        row.as_ref().map(map_row_to_poll).transpose()
    }

    #[instrument(skip_all, name = "sc.repo.upsert_poll_response")]
    async fn upsert_poll_response(
        &self,
        response: &PollResponse,
    ) -> Result<PollResponse, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO session_poll_responses (poll_id, user_id, answer, submitted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (poll_id, user_id)
            DO UPDATE SET answer = EXCLUDED.answer, submitted_at = EXCLUDED.submitted_at
            RETURNING poll_id, user_id, answer, submitted_at
            "#,
        )
        .bind(response.poll_id)
        .bind(response.user_id.as_uuid())
        .bind(Json(&response.answer))
        .bind(response.submitted_at)
        .fetch_one(&self.pool)
        .await;
        let row = observe("upsert_poll_response", start, result)?;
        Ok(map_row_to_poll_response(&row))
    }

    #[instrument(skip_all, name = "sc.repo.list_poll_responses")]
    async fn list_poll_responses(&self, poll_id: Uuid) -> Result<Vec<PollResponse>, ScError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            SELECT poll_id, user_id, answer, submitted_at
            FROM session_poll_responses
            WHERE poll_id = $1
            ORDER BY submitted_at
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await;
        let rows = observe("list_poll_responses", start, result)?;
        Ok(rows.iter().map(map_row_to_poll_response).collect())
    }
}

/// Capacity check and attendance write under a row lock on the session.
async fn admit_in_transaction(
    pool: &PgPool,
    session_id: SessionId,
    student_id: UserId,
    max_participants: i32,
    now: DateTime<Utc>,
) -> Result<Result<Admission, ScError>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Serializes concurrent admissions for this session.
    sqlx::query("SELECT id FROM live_sessions WHERE id = $1 FOR UPDATE")
        .bind(session_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

    let existing = sqlx::query(
        "SELECT status FROM session_attendance WHERE session_id = $1 AND student_id = $2",
    )
    .bind(session_id.as_uuid())
    .bind(student_id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;
    let already_joined = existing
        .map(|row| row.get::<String, _>("status") == "joined")
        .unwrap_or(false);

    if already_joined {
        let query = format!(
            "UPDATE session_attendance SET updated_at = $3 \
             WHERE session_id = $1 AND student_id = $2 RETURNING {ATTENDANCE_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(session_id.as_uuid())
            .bind(student_id.as_uuid())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(map_row_to_attendance(&row).map(Admission::AlreadyJoined));
    }

    let joined: i64 = sqlx::query(
        "SELECT COUNT(*) AS joined FROM session_attendance \
         WHERE session_id = $1 AND status = 'joined'",
    )
    .bind(session_id.as_uuid())
    .fetch_one(&mut *tx)
    .await?
    .get("joined");

    if joined >= i64::from(max_participants) {
        tx.rollback().await?;
        return Ok(Ok(Admission::Full));
    }

    let query = format!(
        r#"
        INSERT INTO session_attendance (session_id, student_id, status, joined_at, updated_at)
        VALUES ($1, $2, 'joined', $3, $3)
        ON CONFLICT (session_id, student_id)
        DO UPDATE SET status = 'joined', joined_at = $3, left_at = NULL, updated_at = $3
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    );
    let row = sqlx::query(&query)
        .bind(session_id.as_uuid())
        .bind(student_id.as_uuid())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(map_row_to_attendance(&row).map(Admission::Admitted))
}

fn map_row_to_session(row: &PgRow) -> Result<Session, ScError> {
    Ok(Session {
        id: SessionId::from_uuid(row.get("id")),
        course_id: CourseId::from_uuid(row.get("course_id")),
        mentor_id: UserId::from_uuid(row.get("mentor_id")),
        title: row.get("title"),
        description: row.get("description"),
        scheduled_start: row.get("scheduled_start"),
        scheduled_end: row.get("scheduled_end"),
        actual_start: row.get("actual_start"),
        actual_end: row.get("actual_end"),
        meeting_link: row.get("meeting_link"),
        external_meeting_id: row.get("external_meeting_id"),
        max_participants: row.get("max_participants"),
        status: row.get::<String, _>("status").parse()?,
        chat_enabled: row.get("chat_enabled"),
        qa_enabled: row.get("qa_enabled"),
        polls_enabled: row.get("polls_enabled"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_row_to_attendance(row: &PgRow) -> Result<Attendance, ScError> {
    Ok(Attendance {
        session_id: SessionId::from_uuid(row.get("session_id")),
        student_id: UserId::from_uuid(row.get("student_id")),
        status: row.get::<String, _>("status").parse()?,
        joined_at: row.get("joined_at"),
        left_at: row.get("left_at"),
        duration_seconds: row.get("duration_seconds"),
        updated_at: row.get("updated_at"),
    })
}

fn map_row_to_chat_message(row: &PgRow) -> Result<ChatMessage, ScError> {
    Ok(ChatMessage {
        id: row.get("id"),
        session_id: SessionId::from_uuid(row.get("session_id")),
        author_id: UserId::from_uuid(row.get("author_id")),
        author_role: row
            .get::<String, _>("author_role")
            .parse()
            .map_err(|e| ScError::Internal(format!("{e}")))?,
        body: row.get("body"),
        message_type: row.get::<String, _>("message_type").parse()?,
        visibility: row.get::<String, _>("visibility").parse()?,
        recipient_id: row
            .get::<Option<Uuid>, _>("recipient_id")
            .map(UserId::from_uuid),
        reply_to: row.get("reply_to"),
        created_at: row.get("created_at"),
    })
}

fn map_row_to_question(row: &PgRow) -> Result<Question, ScError> {
    Ok(Question {
        id: row.get("id"),
        session_id: SessionId::from_uuid(row.get("session_id")),
        student_id: UserId::from_uuid(row.get("student_id")),
        body: row.get("body"),
        is_anonymous: row.get("is_anonymous"),
        status: row.get::<String, _>("status").parse()?,
        answer: row.get("answer"),
        answered_by: row
            .get::<Option<Uuid>, _>("answered_by")
            .map(UserId::from_uuid),
        answered_at: row.get("answered_at"),
        created_at: row.get("created_at"),
    })
}

fn map_row_to_poll(row: &PgRow) -> Result<Poll, ScError> {
    let Json(options): Json<Vec<PollOption>> = row.get("options");
    Ok(Poll {
        id: row.get("id"),
        session_id: SessionId::from_uuid(row.get("session_id")),
        created_by: UserId::from_uuid(row.get("created_by")),
        question: row.get("question"),
        options,
        poll_type: row.get::<String, _>("poll_type").parse()?,
        is_anonymous: row.get("is_anonymous"),
        is_active: row.get("is_active"),
        ends_at: row.get("ends_at"),
        created_at: row.get("created_at"),
    })
}

fn map_row_to_poll_response(row: &PgRow) -> PollResponse {
    let Json(answer): Json<PollAnswer> = row.get("answer");
    PollResponse {
        poll_id: row.get("poll_id"),
        user_id: UserId::from_uuid(row.get("user_id")),
        answer,
        submitted_at: row.get("submitted_at"),
    }
}
