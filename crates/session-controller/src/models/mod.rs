//! Session Controller models.
//!
//! Contains the durable records owned by the session store and the
//! request/patch types accepted at the boundary.

use crate::errors::ScError;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{CourseId, Role, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of a session title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum attendee capacity accepted for a single session.
pub const MAX_PARTICIPANTS_LIMIT: i32 = 1000;

/// Minimum and maximum number of options for choice polls.
pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

/// Inclusive range accepted for rating polls.
pub const RATING_MIN: i32 = 1;
pub const RATING_MAX: i32 = 5;

// ============================================================================
// Session
// ============================================================================

/// Session status.
///
/// `scheduled -> live -> completed`, with `cancelled` reachable from either
/// non-terminal state. Nothing leaves `completed` or `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Scheduled but not yet started.
    Scheduled,
    /// At least one student has joined after the start time.
    Live,
    /// Ended by the mentor.
    Completed,
    /// Cancelled by the mentor.
    Cancelled,
}

impl SessionStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Live => "live",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Scheduled, SessionStatus::Live)
                | (SessionStatus::Scheduled, SessionStatus::Cancelled)
                | (SessionStatus::Live, SessionStatus::Completed)
                | (SessionStatus::Live, SessionStatus::Cancelled)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "live" => Ok(SessionStatus::Live),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(ScError::Internal(format!("unknown session status '{other}'"))),
        }
    }
}

/// A scheduled live class backed by an external meeting.
///
/// A row only exists once the provider meeting was created, so
/// `external_meeting_id` and `meeting_link` are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub course_id: CourseId,
    pub mentor_id: UserId,
    pub title: String,
    pub description: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end: Option<DateTime<Utc>>,
    pub meeting_link: String,
    pub external_meeting_id: String,
    pub max_participants: i32,
    pub status: SessionStatus,
    pub chat_enabled: bool,
    pub qa_enabled: bool,
    pub polls_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a session row is first persisted.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub course_id: CourseId,
    pub mentor_id: UserId,
    pub title: String,
    pub description: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub meeting_link: String,
    pub external_meeting_id: String,
    pub max_participants: i32,
    pub chat_enabled: bool,
    pub qa_enabled: bool,
    pub polls_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Request body for `POST /v1/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub max_participants: i32,
    #[serde(default = "default_true")]
    pub chat_enabled: bool,
    #[serde(default = "default_true")]
    pub qa_enabled: bool,
    #[serde(default = "default_true")]
    pub polls_enabled: bool,
    /// Optional invitees forwarded to the provider.
    #[serde(default)]
    pub attendee_emails: Vec<String>,
}

impl CreateSessionRequest {
    /// Validate required fields, time window and capacity.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_title(&self.title)?;
        validate_window(self.scheduled_start, self.scheduled_end)?;
        validate_capacity(self.max_participants)
    }
}

/// Request body for `PATCH /v1/sessions/{id}`.
///
/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub max_participants: Option<i32>,
    pub status: Option<SessionStatus>,
    pub chat_enabled: Option<bool>,
    pub qa_enabled: Option<bool>,
    pub polls_enabled: Option<bool>,
}

impl SessionPatch {
    /// Whether the remote meeting must be updated before the local write.
    pub fn touches_remote(&self) -> bool {
        self.title.is_some() || self.scheduled_start.is_some() || self.scheduled_end.is_some()
    }

    /// Whether anything other than `status` is being changed.
    pub fn changes_details(&self) -> bool {
        self.touches_remote()
            || self.description.is_some()
            || self.max_participants.is_some()
            || self.chat_enabled.is_some()
            || self.qa_enabled.is_some()
            || self.polls_enabled.is_some()
    }

    /// Validate the patched fields in isolation.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(max) = self.max_participants {
            validate_capacity(max)?;
        }
        Ok(())
    }

    /// Apply the patch on top of `session`, returning the merged record.
    ///
    /// Status is not applied here; transitions go through the state machine.
    pub fn apply_to(&self, session: &Session) -> Session {
        let mut merged = session.clone();
        if let Some(title) = &self.title {
            merged.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            merged.description = description.clone();
        }
        if let Some(start) = self.scheduled_start {
            merged.scheduled_start = start;
        }
        if let Some(end) = self.scheduled_end {
            merged.scheduled_end = end;
        }
        if let Some(max) = self.max_participants {
            merged.max_participants = max;
        }
        if let Some(flag) = self.chat_enabled {
            merged.chat_enabled = flag;
        }
        if let Some(flag) = self.qa_enabled {
            merged.qa_enabled = flag;
        }
        if let Some(flag) = self.polls_enabled {
            merged.polls_enabled = flag;
        }
        merged
    }
}

fn validate_title(title: &str) -> Result<(), &'static str> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title is required");
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err("Title must be at most 200 characters");
    }
    Ok(())
}

/// Check that a scheduled window ends strictly after it starts.
pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), &'static str> {
    if end <= start {
        return Err("Scheduled end must be after scheduled start");
    }
    Ok(())
}

fn validate_capacity(max_participants: i32) -> Result<(), &'static str> {
    if max_participants < 1 {
        return Err("Maximum participants must be at least 1");
    }
    if max_participants > MAX_PARTICIPANTS_LIMIT {
        return Err("Maximum participants must be at most 1000");
    }
    Ok(())
}

// ============================================================================
// Attendance
// ============================================================================

/// Attendance status for one (session, student) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Registered,
    Joined,
    Left,
    Completed,
}

impl AttendanceStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Registered => "registered",
            AttendanceStatus::Joined => "joined",
            AttendanceStatus::Left => "left",
            AttendanceStatus::Completed => "completed",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(AttendanceStatus::Registered),
            "joined" => Ok(AttendanceStatus::Joined),
            "left" => Ok(AttendanceStatus::Left),
            "completed" => Ok(AttendanceStatus::Completed),
            other => Err(ScError::Internal(format!(
                "unknown attendance status '{other}'"
            ))),
        }
    }
}

/// One attendance record per (session, student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub session_id: SessionId,
    pub student_id: UserId,
    pub status: AttendanceStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    /// Accumulated attended time across join/leave cycles.
    pub duration_seconds: i64,
    pub updated_at: DateTime<Utc>,
}

impl Attendance {
    /// Build the `left` record for an active attendance at `now`.
    pub fn leave_at(&self, now: DateTime<Utc>) -> Attendance {
        let attended = self
            .joined_at
            .map(|joined| (now - joined).num_seconds().max(0))
            .unwrap_or(0);
        Attendance {
            status: AttendanceStatus::Left,
            left_at: Some(now),
            duration_seconds: self.duration_seconds.saturating_add(attended),
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Outcome of a single admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new `joined` record was written (or a `left` one reactivated).
    Admitted(Attendance),
    /// The student was already `joined`; the existing record was refreshed.
    AlreadyJoined(Attendance),
    /// Joined count had reached capacity.
    Full,
}

// ============================================================================
// Chat / Q&A
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Question,
    Answer,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Question => "question",
            MessageType::Answer => "answer",
            MessageType::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "question" => Ok(MessageType::Question),
            "answer" => Ok(MessageType::Answer),
            "system" => Ok(MessageType::System),
            other => Err(ScError::Internal(format!("unknown message type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    #[default]
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

impl FromStr for Visibility {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            other => Err(ScError::Internal(format!("unknown visibility '{other}'"))),
        }
    }
}

/// Append-only chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: SessionId,
    pub author_id: UserId,
    pub author_role: Role,
    pub body: String,
    pub message_type: MessageType,
    pub visibility: Visibility,
    /// Addressee of a private message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Answered,
    Dismissed,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Pending => "pending",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for QuestionStatus {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuestionStatus::Pending),
            "answered" => Ok(QuestionStatus::Answered),
            "dismissed" => Ok(QuestionStatus::Dismissed),
            other => Err(ScError::Internal(format!(
                "unknown question status '{other}'"
            ))),
        }
    }
}

/// A student question. Only the "answer" transition mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub session_id: SessionId,
    pub student_id: UserId,
    pub body: String,
    pub is_anonymous: bool,
    pub status: QuestionStatus,
    pub answer: Option<String>,
    pub answered_by: Option<UserId>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Polls
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollType {
    SingleChoice,
    MultipleChoice,
    Text,
    Rating,
}

impl PollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollType::SingleChoice => "single_choice",
            PollType::MultipleChoice => "multiple_choice",
            PollType::Text => "text",
            PollType::Rating => "rating",
        }
    }

    /// Whether responses select from the option list.
    pub fn is_choice(&self) -> bool {
        matches!(self, PollType::SingleChoice | PollType::MultipleChoice)
    }
}

impl FromStr for PollType {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(PollType::SingleChoice),
            "multiple_choice" => Ok(PollType::MultipleChoice),
            "text" => Ok(PollType::Text),
            "rating" => Ok(PollType::Rating),
            other => Err(ScError::Internal(format!("unknown poll type '{other}'"))),
        }
    }
}

/// A poll option; `id` is derived from its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
}

/// Build options with stable index-derived ids (`option_0`, `option_1`, ...).
pub fn indexed_options<I, S>(texts: I) -> Vec<PollOption>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| PollOption {
            id: format!("option_{index}"),
            text: text.into(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub session_id: SessionId,
    pub created_by: UserId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub poll_type: PollType,
    pub is_anonymous: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Whether a response submitted at `now` may be accepted.
    pub fn accepts_responses_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.ends_at.map_or(true, |ends_at| now < ends_at)
    }

    /// Check a submitted answer against this poll's type and options.
    pub fn validate_answer(&self, answer: &PollAnswer) -> Result<(), &'static str> {
        match self.poll_type {
            PollType::SingleChoice => {
                if answer.selected_options.len() != 1 {
                    return Err("Select exactly one option");
                }
            }
            PollType::MultipleChoice => {
                if answer.selected_options.is_empty() {
                    return Err("Select at least one option");
                }
                let mut seen = std::collections::HashSet::new();
                if !answer.selected_options.iter().all(|id| seen.insert(id)) {
                    return Err("Options must not repeat");
                }
            }
            PollType::Text => {
                if answer.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    return Err("A text answer is required");
                }
            }
            PollType::Rating => match answer.rating {
                Some(rating) if (RATING_MIN..=RATING_MAX).contains(&rating) => {}
                _ => return Err("Rating must be between 1 and 5"),
            },
        }

        if self.poll_type.is_choice() {
            let known = answer
                .selected_options
                .iter()
                .all(|id| self.options.iter().any(|o| &o.id == id));
            if !known {
                return Err("Unknown poll option");
            }
        }

        Ok(())
    }
}

/// Answer payload of a poll response; which fields apply depends on `PollType`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollAnswer {
    #[serde(default)]
    pub selected_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

/// One response per (poll, user); resubmission overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub poll_id: Uuid,
    pub user_id: UserId,
    pub answer: PollAnswer,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionCount {
    pub option_id: String,
    pub count: u64,
}

/// Aggregated poll results. Carries no respondent identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: Uuid,
    pub total_responses: u64,
    pub option_counts: Vec<OptionCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

impl PollResults {
    /// Tally `responses` for `poll`.
    pub fn tally(poll: &Poll, responses: &[PollResponse]) -> Self {
        let option_counts = poll
            .options
            .iter()
            .map(|option| OptionCount {
                option_id: option.id.clone(),
                count: responses
                    .iter()
                    .filter(|r| r.answer.selected_options.contains(&option.id))
                    .count() as u64,
            })
            .collect();

        let ratings: Vec<i32> = responses.iter().filter_map(|r| r.answer.rating).collect();
        let average_rating = if poll.poll_type == PollType::Rating && !ratings.is_empty() {
            Some(ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64)
        } else {
            None
        };

        Self {
            poll_id: poll.id,
            total_responses: responses.len() as u64,
            option_counts,
            average_rating,
        }
    }
}

// ============================================================================
// Integration / responses
// ============================================================================

/// A mentor's meeting-provider integration.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub mentor_id: UserId,
    pub access_token: SecretString,
}

/// Response body for `POST /v1/sessions/{id}/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub attendance: Attendance,
    /// `None` when the provider could not supply a link. Joining again
    /// retries resolution without taking another slot.
    pub meeting_link: Option<String>,
    pub session_status: SessionStatus,
}

/// Response body for `POST /v1/sessions/{id}/leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveResponse {
    /// `None` when there was no active attendance.
    pub attendance: Option<Attendance>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}
