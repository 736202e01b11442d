//! Message types for the broadcast engine.
//!
//! Client and server events are the socket wire format (JSON, tagged by
//! `type`). Actor mailbox messages use `tokio::sync::mpsc` with
//! `tokio::sync::oneshot` for request-reply.

use super::connection::ConnectionHandle;
use super::room::RoomHandle;
use crate::errors::ScError;
use crate::models::{
    ChatMessage, Poll, PollResults, PollType, Question, QuestionStatus, Session, SessionStatus,
    Visibility,
};
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, Identity, Role, SessionId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Client events
// ----------------------------------------------------------------------------

/// Who may issue a client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Any connected participant.
    Any,
    /// Students only.
    Student,
    /// Only the mentor who owns the session.
    OwningMentor,
}

/// Events sent by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage {
        body: String,
        #[serde(default)]
        visibility: Visibility,
        #[serde(default)]
        recipient_id: Option<UserId>,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },
    CreateQuestion {
        body: String,
        #[serde(default)]
        is_anonymous: bool,
    },
    AnswerQuestion {
        question_id: Uuid,
        answer: String,
    },
    CreatePoll {
        question: String,
        #[serde(default)]
        options: Vec<String>,
        poll_type: PollType,
        #[serde(default)]
        is_anonymous: bool,
        #[serde(default)]
        ends_at: Option<DateTime<Utc>>,
    },
    SubmitPollResponse {
        poll_id: Uuid,
        #[serde(default)]
        selected_options: Vec<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        rating: Option<i32>,
    },
    ClosePoll {
        poll_id: Uuid,
    },
    TypingStart,
    TypingStop,
}

impl ClientEvent {
    /// Role gate for this event.
    pub fn required_role(&self) -> RoleRequirement {
        match self {
            ClientEvent::CreateQuestion { .. } => RoleRequirement::Student,
            ClientEvent::AnswerQuestion { .. }
            | ClientEvent::CreatePoll { .. }
            | ClientEvent::ClosePoll { .. } => RoleRequirement::OwningMentor,
            ClientEvent::SendMessage { .. }
            | ClientEvent::SubmitPollResponse { .. }
            | ClientEvent::TypingStart
            | ClientEvent::TypingStop => RoleRequirement::Any,
        }
    }

    /// Stable event name used in metrics and error events.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::CreateQuestion { .. } => "create_question",
            ClientEvent::AnswerQuestion { .. } => "answer_question",
            ClientEvent::CreatePoll { .. } => "create_poll",
            ClientEvent::SubmitPollResponse { .. } => "submit_poll_response",
            ClientEvent::ClosePoll { .. } => "close_poll",
            ClientEvent::TypingStart => "typing_start",
            ClientEvent::TypingStop => "typing_stop",
        }
    }
}

// ----------------------------------------------------------------------------
// Server events
// ----------------------------------------------------------------------------

/// A participant as seen by other room members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub role: Role,
}

impl From<Identity> for ParticipantInfo {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.user_id,
            role: identity.role,
        }
    }
}

/// Broadcast form of a question.
///
/// `student_id` is `None` for anonymous questions; the id is dropped from
/// the payload itself, not just hidden by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<UserId>,
    pub body: String,
    pub is_anonymous: bool,
    pub status: QuestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            session_id: question.session_id,
            student_id: (!question.is_anonymous).then_some(question.student_id),
            body: question.body.clone(),
            is_anonymous: question.is_anonymous,
            status: question.status,
            answer: question.answer.clone(),
            answered_by: question.answered_by,
            answered_at: question.answered_at,
            created_at: question.created_at,
        }
    }
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First event on every connection.
    RoomSnapshot {
        session_id: SessionId,
        status: SessionStatus,
        participants: Vec<ParticipantInfo>,
        chat_enabled: bool,
        qa_enabled: bool,
        polls_enabled: bool,
    },
    PresenceJoined {
        participant: ParticipantInfo,
    },
    PresenceLeft {
        participant: ParticipantInfo,
    },
    ChatMessage {
        message: ChatMessage,
    },
    QuestionCreated {
        question: QuestionView,
    },
    QuestionAnswered {
        question: QuestionView,
    },
    PollCreated {
        poll: Poll,
    },
    PollResults {
        results: PollResults,
    },
    PollClosed {
        poll_id: Uuid,
    },
    Typing {
        user_id: UserId,
        is_typing: bool,
    },
    SessionStatusChanged {
        session_id: SessionId,
        status: SessionStatus,
    },
    /// Rejection of the caller's own event.
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

impl ServerEvent {
    /// Error event for a rejected client event.
    pub fn error(err: &ScError, event: Option<&str>) -> Self {
        ServerEvent::Error {
            code: err.error_code().to_string(),
            message: err.client_message(),
            event: event.map(str::to_string),
        }
    }
}

// ----------------------------------------------------------------------------
// Actor mailbox messages
// ----------------------------------------------------------------------------

/// Messages sent to `RoomRegistry`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Attach a connection to the session's room, creating the room if needed.
    Connect {
        session: Session,
        identity: Identity,
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<Result<RoomHandle, ScError>>,
    },

    /// Detach a connection; the room is pruned when its last connection leaves.
    Disconnect {
        session_id: SessionId,
        connection_id: ConnectionId,
    },

    /// Forward a lifecycle change to the session's room, if any.
    SessionUpdated { session: Session },

    /// Snapshot of one room.
    RoomState {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<RoomState>>,
    },

    /// Registry-wide counters.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    Connect {
        identity: Identity,
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    Disconnect { connection_id: ConnectionId },

    /// A client event from one of the room's connections.
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
    },

    SessionUpdated { session: Session },

    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// State of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub connection_count: usize,
    /// Distinct connected users.
    pub participants: Vec<ParticipantInfo>,
}

/// Status of the `RoomRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub room_count: usize,
    pub connection_count: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"create_question","body":"Why Pin?","is_anonymous":true}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::CreateQuestion {
                body: "Why Pin?".to_string(),
                is_anonymous: true
            }
        );
        assert_eq!(event.kind(), "create_question");

        let typing: ClientEvent = serde_json::from_str(r#"{"type":"typing_start"}"#).unwrap();
        assert_eq!(typing, ClientEvent::TypingStart);

        let message: ClientEvent =
            serde_json::from_str(r#"{"type":"send_message","body":"hi"}"#).unwrap();
        assert!(matches!(
            message,
            ClientEvent::SendMessage {
                visibility: Visibility::Public,
                recipient_id: None,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"delete_room"}"#).is_err());
    }

    #[test]
    fn test_role_requirements() {
        let answer = ClientEvent::AnswerQuestion {
            question_id: Uuid::new_v4(),
            answer: "x".into(),
        };
        assert_eq!(answer.required_role(), RoleRequirement::OwningMentor);
        assert_eq!(
            ClientEvent::CreateQuestion {
                body: "q".into(),
                is_anonymous: false
            }
            .required_role(),
            RoleRequirement::Student
        );
        assert_eq!(ClientEvent::TypingStop.required_role(), RoleRequirement::Any);
        assert_eq!(
            ClientEvent::ClosePoll {
                poll_id: Uuid::new_v4()
            }
            .required_role(),
            RoleRequirement::OwningMentor
        );
    }

    #[test]
    fn test_anonymous_question_view_strips_student_id() {
        let student_id = UserId::new();
        let question = Question {
            id: Uuid::new_v4(),
            session_id: SessionId::new(),
            student_id,
            body: "Is this on the exam?".to_string(),
            is_anonymous: true,
            status: QuestionStatus::Pending,
            answer: None,
            answered_by: None,
            answered_at: None,
            created_at: Utc::now(),
        };

        let event = ServerEvent::QuestionCreated {
            question: QuestionView::from(&question),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains(&student_id.to_string()));
        assert!(!json.contains("student_id"));

        let named = Question {
            is_anonymous: false,
            ..question
        };
        assert_eq!(QuestionView::from(&named).student_id, Some(student_id));
    }

    #[test]
    fn test_error_event_uses_stable_code() {
        let event = ServerEvent::error(&ScError::NotEnrolled, Some("send_message"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "NOT_ENROLLED");
        assert_eq!(json["event"], "send_message");
    }
}
