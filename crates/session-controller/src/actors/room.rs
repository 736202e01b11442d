//! `RoomActor` - one actor per session with live connections.
//!
//! Every mutating event for a session passes through this actor's mailbox,
//! so all listeners observe chat, Q&A, poll and presence events in the order
//! the room accepted them. Durable events are written to the store before
//! they are broadcast.
//!
//! # Lifecycle
//!
//! 1. Spawned by `RoomRegistry` on the first connection to a session
//! 2. Runs until cancelled by the registry (last connection left, shutdown)
//!    or until the session reaches a terminal status
//! 3. On exit, every member connection is closed

use super::connection::ConnectionHandle;
use super::messages::{
    ClientEvent, ParticipantInfo, QuestionView, RoleRequirement, RoomMessage, RoomState,
    ServerEvent,
};
use crate::errors::ScError;
use crate::models::{
    indexed_options, ChatMessage, MessageType, Poll, PollAnswer, PollResponse, PollResults,
    Question, QuestionStatus, Session, Visibility, MAX_POLL_OPTIONS, MIN_POLL_OPTIONS,
};
use crate::observability::metrics;
use crate::repositories::SessionStore;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, Identity, Role, SessionId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Per-room limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    /// Maximum length of chat, question and answer bodies.
    pub chat_max_length: usize,
}

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    session_id: SessionId,
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
}

impl RoomHandle {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Attach a connection. The connection receives a room snapshot first.
    pub(crate) async fn connect(
        &self,
        identity: Identity,
        connection: ConnectionHandle,
    ) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::Connect {
                identity,
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Submit a client event. Rejections come back on the connection as
    /// `error` events.
    pub async fn send_event(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), ScError> {
        self.sender
            .send(RoomMessage::Event {
                connection_id,
                event,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    pub(crate) async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), ScError> {
        self.sender
            .send(RoomMessage::Disconnect { connection_id })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    pub(crate) async fn session_updated(&self, session: Session) -> Result<(), ScError> {
        self.sender
            .send(RoomMessage::SessionUpdated { session })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Get the current room state.
    pub async fn get_state(&self) -> Result<RoomState, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Recipients of a broadcast.
enum Audience {
    All,
    AllExcept(ConnectionId),
    /// Every connection of the listed users.
    Users(Vec<UserId>),
}

impl Audience {
    fn includes(&self, connection_id: ConnectionId, user_id: UserId) -> bool {
        match self {
            Audience::All => true,
            Audience::AllExcept(excluded) => *excluded != connection_id,
            Audience::Users(users) => users.contains(&user_id),
        }
    }
}

struct Member {
    identity: Identity,
    connection: ConnectionHandle,
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    session: Session,
    store: Arc<dyn SessionStore>,
    settings: RoomSettings,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    members: HashMap<ConnectionId, Member>,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session: Session,
        store: Arc<dyn SessionStore>,
        settings: RoomSettings,
        cancel_token: CancellationToken,
    ) -> (RoomHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let session_id = session.id;

        let actor = Self {
            session,
            store,
            settings,
            receiver,
            cancel_token: cancel_token.clone(),
            members: HashMap::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomHandle {
            session_id,
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "sc.actor.room", fields(session_id = %self.session.id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.room",
            session_id = %self.session.id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.room",
                        session_id = %self.session.id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.close_all();
        info!(
            target: "sc.actor.room",
            session_id = %self.session.id,
            "RoomActor stopped"
        );
    }

    /// Handle a single message. Returns `true` when the room should exit.
    async fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Connect {
                identity,
                connection,
                respond_to,
            } => {
                let result = self.handle_connect(identity, connection);
                let _ = respond_to.send(result);
                false
            }

            RoomMessage::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
                false
            }

            RoomMessage::Event {
                connection_id,
                event,
            } => {
                self.handle_event(connection_id, event).await;
                false
            }

            RoomMessage::SessionUpdated { session } => self.handle_session_updated(session),

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
                false
            }
        }
    }

    fn handle_connect(
        &mut self,
        identity: Identity,
        connection: ConnectionHandle,
    ) -> Result<(), ScError> {
        if self.session.status.is_terminal() {
            return Err(ScError::SessionUnavailable(
                "Session has ended".to_string(),
            ));
        }

        let connection_id = connection.id();
        self.members.insert(
            connection_id,
            Member {
                identity,
                connection: connection.clone(),
            },
        );

        let snapshot = ServerEvent::RoomSnapshot {
            session_id: self.session.id,
            status: self.session.status,
            participants: self.participants(),
            chat_enabled: self.session.chat_enabled,
            qa_enabled: self.session.qa_enabled,
            polls_enabled: self.session.polls_enabled,
        };
        if !connection.try_deliver(snapshot) {
            self.drop_member(connection_id);
            return Ok(());
        }

        self.broadcast(
            ServerEvent::PresenceJoined {
                participant: identity.into(),
            },
            Audience::AllExcept(connection_id),
        );

        debug!(
            target: "sc.actor.room",
            session_id = %self.session.id,
            user_id = %identity.user_id,
            connection_id = %connection_id,
            members = self.members.len(),
            "Connection joined room"
        );
        Ok(())
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if let Some(member) = self.members.remove(&connection_id) {
            self.broadcast(
                ServerEvent::PresenceLeft {
                    participant: member.identity.into(),
                },
                Audience::AllExcept(connection_id),
            );
            debug!(
                target: "sc.actor.room",
                session_id = %self.session.id,
                user_id = %member.identity.user_id,
                connection_id = %connection_id,
                "Connection left room"
            );
        }
    }

    async fn handle_event(&mut self, connection_id: ConnectionId, event: ClientEvent) {
        let Some(identity) = self.members.get(&connection_id).map(|m| m.identity) else {
            debug!(
                target: "sc.actor.room",
                session_id = %self.session.id,
                connection_id = %connection_id,
                "Event from unknown connection ignored"
            );
            return;
        };

        let kind = event.kind();
        let result = match self.authorize(event.required_role(), &identity) {
            Ok(()) => self.apply_event(connection_id, identity, event).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => metrics::record_room_event(kind, "accepted"),
            Err(err) => {
                let outcome = match err {
                    ScError::PersistenceFailure(_) | ScError::Internal(_) => {
                        warn!(
                            target: "sc.actor.room",
                            session_id = %self.session.id,
                            event = kind,
                            error = %err,
                            "Room event failed"
                        );
                        "error"
                    }
                    _ => {
                        debug!(
                            target: "sc.actor.room",
                            session_id = %self.session.id,
                            user_id = %identity.user_id,
                            event = kind,
                            code = err.error_code(),
                            "Room event rejected"
                        );
                        "rejected"
                    }
                };
                metrics::record_room_event(kind, outcome);
                self.send_to(connection_id, ServerEvent::error(&err, Some(kind)));
            }
        }
    }

    fn authorize(&self, requirement: RoleRequirement, identity: &Identity) -> Result<(), ScError> {
        match requirement {
            RoleRequirement::Any => Ok(()),
            RoleRequirement::Student if identity.role == Role::Student => Ok(()),
            RoleRequirement::Student => Err(ScError::AccessDenied(
                "Only students can perform this action".to_string(),
            )),
            RoleRequirement::OwningMentor
                if identity.is_mentor() && identity.user_id == self.session.mentor_id =>
            {
                Ok(())
            }
            RoleRequirement::OwningMentor => Err(ScError::AccessDenied(
                "Only the session's mentor can perform this action".to_string(),
            )),
        }
    }

    /// Apply an authorized event: validate, persist, then broadcast.
    async fn apply_event(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        event: ClientEvent,
    ) -> Result<(), ScError> {
        let now = Utc::now();
        let is_typing = matches!(event, ClientEvent::TypingStart);

        match event {
            ClientEvent::SendMessage {
                body,
                visibility,
                recipient_id,
                reply_to,
            } => {
                self.send_message(identity, body, visibility, recipient_id, reply_to, now)
                    .await
            }

            ClientEvent::CreateQuestion { body, is_anonymous } => {
                self.require_flag(self.session.qa_enabled, "Q&A")?;
                let body = self.checked_body(&body, "Question")?;
                let question = Question {
                    id: Uuid::new_v4(),
                    session_id: self.session.id,
                    student_id: identity.user_id,
                    body,
                    is_anonymous,
                    status: QuestionStatus::Pending,
                    answer: None,
                    answered_by: None,
                    answered_at: None,
                    created_at: now,
                };
                self.store.insert_question(&question).await?;
                self.broadcast(
                    ServerEvent::QuestionCreated {
                        question: QuestionView::from(&question),
                    },
                    Audience::All,
                );
                Ok(())
            }

            ClientEvent::AnswerQuestion {
                question_id,
                answer,
            } => {
                self.require_flag(self.session.qa_enabled, "Q&A")?;
                let answer = self.checked_body(&answer, "Answer")?;
                let answered = self
                    .store
                    .answer_question(self.session.id, question_id, &answer, identity.user_id, now)
                    .await?;
                let question = match answered {
                    Some(question) => question,
                    None => {
                        return match self.store.get_question(self.session.id, question_id).await? {
                            Some(_) => Err(ScError::Conflict(
                                "Question has already been answered".to_string(),
                            )),
                            None => Err(ScError::NotFound("Question not found".to_string())),
                        };
                    }
                };
                self.broadcast(
                    ServerEvent::QuestionAnswered {
                        question: QuestionView::from(&question),
                    },
                    Audience::All,
                );
                Ok(())
            }

            ClientEvent::CreatePoll {
                question,
                options,
                poll_type,
                is_anonymous,
                ends_at,
            } => {
                self.require_flag(self.session.polls_enabled, "Polls")?;
                let question = question.trim().to_string();
                if question.is_empty() {
                    return Err(ScError::Validation("Poll question is required".to_string()));
                }
                let options = if poll_type.is_choice() {
                    let texts: Vec<String> =
                        options.iter().map(|o| o.trim().to_string()).collect();
                    if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&texts.len()) {
                        return Err(ScError::Validation(format!(
                            "Choice polls need between {MIN_POLL_OPTIONS} and {MAX_POLL_OPTIONS} options"
                        )));
                    }
                    if texts.iter().any(String::is_empty) {
                        return Err(ScError::Validation(
                            "Poll options must not be empty".to_string(),
                        ));
                    }
                    indexed_options(texts)
                } else {
                    Vec::new()
                };
                if ends_at.is_some_and(|end| end <= now) {
                    return Err(ScError::Validation(
                        "Poll end time must be in the future".to_string(),
                    ));
                }

                let poll = Poll {
                    id: Uuid::new_v4(),
                    session_id: self.session.id,
                    created_by: identity.user_id,
                    question,
                    options,
                    poll_type,
                    is_anonymous,
                    is_active: true,
                    ends_at,
                    created_at: now,
                };
                self.store.insert_poll(&poll).await?;
                self.broadcast(ServerEvent::PollCreated { poll }, Audience::All);
                Ok(())
            }

            ClientEvent::SubmitPollResponse {
                poll_id,
                selected_options,
                text,
                rating,
            } => {
                self.require_flag(self.session.polls_enabled, "Polls")?;
                let poll = self
                    .store
                    .get_poll(self.session.id, poll_id)
                    .await?
                    .ok_or_else(|| ScError::NotFound("Poll not found".to_string()))?;
                if !poll.accepts_responses_at(now) {
                    return Err(ScError::Validation("Poll is closed".to_string()));
                }

                let answer = PollAnswer {
                    selected_options,
                    text: text.map(|t| t.trim().to_string()),
                    rating,
                };
                poll.validate_answer(&answer)
                    .map_err(|reason| ScError::Validation(reason.to_string()))?;

                self.store
                    .upsert_poll_response(&PollResponse {
                        poll_id,
                        user_id: identity.user_id,
                        answer,
                        submitted_at: now,
                    })
                    .await?;
                let responses = self.store.list_poll_responses(poll_id).await?;
                self.broadcast(
                    ServerEvent::PollResults {
                        results: PollResults::tally(&poll, &responses),
                    },
                    Audience::All,
                );
                Ok(())
            }

            ClientEvent::ClosePoll { poll_id } => {
                self.store
                    .close_poll(self.session.id, poll_id)
                    .await?
                    .ok_or_else(|| ScError::NotFound("Poll not found".to_string()))?;
                self.broadcast(ServerEvent::PollClosed { poll_id }, Audience::All);
                Ok(())
            }

            ClientEvent::TypingStart | ClientEvent::TypingStop => {
                self.broadcast(
                    ServerEvent::Typing {
                        user_id: identity.user_id,
                        is_typing,
                    },
                    Audience::AllExcept(connection_id),
                );
                Ok(())
            }
        }
    }

    async fn send_message(
        &mut self,
        identity: Identity,
        body: String,
        visibility: Visibility,
        recipient_id: Option<UserId>,
        reply_to: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), ScError> {
        self.require_flag(self.session.chat_enabled, "Chat")?;
        let body = self.checked_body(&body, "Message")?;

        let recipient_id = match visibility {
            Visibility::Public => None,
            Visibility::Private => Some(recipient_id.ok_or_else(|| {
                ScError::Validation("Private messages need a recipient".to_string())
            })?),
        };

        if let Some(parent) = reply_to {
            if self
                .store
                .get_chat_message(self.session.id, parent)
                .await?
                .is_none()
            {
                return Err(ScError::Validation("Reply target not found".to_string()));
            }
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id: self.session.id,
            author_id: identity.user_id,
            author_role: identity.role,
            body,
            message_type: MessageType::Text,
            visibility,
            recipient_id,
            reply_to,
            created_at: now,
        };
        self.store.insert_chat_message(&message).await?;

        let audience = match recipient_id {
            Some(recipient) => Audience::Users(vec![identity.user_id, recipient]),
            None => Audience::All,
        };
        self.broadcast(ServerEvent::ChatMessage { message }, audience);
        Ok(())
    }

    fn require_flag(&self, enabled: bool, feature: &str) -> Result<(), ScError> {
        if enabled {
            Ok(())
        } else {
            Err(ScError::Validation(format!(
                "{feature} is disabled for this session"
            )))
        }
    }

    fn checked_body(&self, body: &str, field: &str) -> Result<String, ScError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ScError::Validation(format!("{field} must not be empty")));
        }
        if trimmed.chars().count() > self.settings.chat_max_length {
            return Err(ScError::Validation(format!(
                "{field} must be at most {} characters",
                self.settings.chat_max_length
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Returns `true` when the session became terminal and the room must exit.
    fn handle_session_updated(&mut self, session: Session) -> bool {
        let status_changed = session.status != self.session.status;
        self.session = session;

        if status_changed {
            info!(
                target: "sc.actor.room",
                session_id = %self.session.id,
                status = %self.session.status,
                "Session status changed"
            );
            self.broadcast(
                ServerEvent::SessionStatusChanged {
                    session_id: self.session.id,
                    status: self.session.status,
                },
                Audience::All,
            );
        }

        self.session.status.is_terminal()
    }

    fn broadcast(&mut self, event: ServerEvent, audience: Audience) {
        let slow: Vec<ConnectionId> = self
            .members
            .iter()
            .filter(|(id, member)| audience.includes(**id, member.identity.user_id))
            .filter(|(_, member)| !member.connection.try_deliver(event.clone()))
            .map(|(id, _)| *id)
            .collect();

        for connection_id in slow {
            self.drop_member(connection_id);
        }
    }

    fn send_to(&mut self, connection_id: ConnectionId, event: ServerEvent) {
        let delivered = self
            .members
            .get(&connection_id)
            .map(|member| member.connection.try_deliver(event));
        if delivered == Some(false) {
            self.drop_member(connection_id);
        }
    }

    /// Remove a connection that cannot keep up and tell the others it left.
    fn drop_member(&mut self, connection_id: ConnectionId) {
        if let Some(member) = self.members.remove(&connection_id) {
            warn!(
                target: "sc.actor.room",
                session_id = %self.session.id,
                connection_id = %connection_id,
                "Dropping slow connection"
            );
            member.connection.close();
            self.broadcast(
                ServerEvent::PresenceLeft {
                    participant: member.identity.into(),
                },
                Audience::AllExcept(connection_id),
            );
        }
    }

    fn close_all(&mut self) {
        for (_, member) in self.members.drain() {
            member.connection.close();
        }
    }

    /// Distinct connected users, ordered by id.
    fn participants(&self) -> Vec<ParticipantInfo> {
        self.members
            .values()
            .map(|m| (m.identity.user_id, ParticipantInfo::from(m.identity)))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    }

    fn state(&self) -> RoomState {
        RoomState {
            session_id: self.session.id,
            status: self.session.status,
            connection_count: self.members.len(),
            participants: self.participants(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{NewSession, SessionStatus};
    use crate::repositories::InMemorySessionStore;
    use common::types::CourseId;
    use std::time::Duration;

    const SETTINGS: RoomSettings = RoomSettings {
        chat_max_length: 50,
    };

    async fn seeded_session(store: &InMemorySessionStore, mentor: UserId) -> Session {
        let start = Utc::now();
        store
            .insert_session(&NewSession {
                id: SessionId::new(),
                course_id: CourseId::new(),
                mentor_id: mentor,
                title: "Iterators".to_string(),
                description: String::new(),
                scheduled_start: start,
                scheduled_end: start + chrono::Duration::hours(1),
                meeting_link: "https://meet.example.com/x".to_string(),
                external_meeting_id: "x".to_string(),
                max_participants: 10,
                chat_enabled: true,
                qa_enabled: false,
                polls_enabled: true,
            })
            .await
            .unwrap()
    }

    async fn recv(receiver: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
    }

    #[tokio::test]
    async fn test_snapshot_then_presence() {
        let store = Arc::new(InMemorySessionStore::new());
        let mentor = Identity::mentor(UserId::new());
        let session = seeded_session(&store, mentor.user_id).await;
        let (room, _task) =
            RoomActor::spawn(session.clone(), store, SETTINGS, CancellationToken::new());

        let (mentor_conn, mut mentor_rx) = ConnectionHandle::new(16);
        room.connect(mentor, mentor_conn).await.unwrap();
        match recv(&mut mentor_rx).await {
            ServerEvent::RoomSnapshot {
                participants,
                qa_enabled,
                ..
            } => {
                assert_eq!(participants.len(), 1);
                assert!(!qa_enabled);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        let student = Identity::student(UserId::new());
        let (student_conn, mut student_rx) = ConnectionHandle::new(16);
        room.connect(student, student_conn).await.unwrap();

        assert!(matches!(
            recv(&mut student_rx).await,
            ServerEvent::RoomSnapshot { .. }
        ));
        assert_eq!(
            recv(&mut mentor_rx).await,
            ServerEvent::PresenceJoined {
                participant: student.into()
            }
        );

        let state = room.get_state().await.unwrap();
        assert_eq!(state.connection_count, 2);
        assert_eq!(state.status, SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_disabled_feature_is_rejected_to_caller() {
        let store = Arc::new(InMemorySessionStore::new());
        let mentor = Identity::mentor(UserId::new());
        let session = seeded_session(&store, mentor.user_id).await;
        let (room, _task) =
            RoomActor::spawn(session, store, SETTINGS, CancellationToken::new());

        let student = Identity::student(UserId::new());
        let (conn, mut rx) = ConnectionHandle::new(16);
        let conn_id = conn.id();
        room.connect(student, conn).await.unwrap();
        recv(&mut rx).await;

        room.send_event(
            conn_id,
            ClientEvent::CreateQuestion {
                body: "Why?".to_string(),
                is_anonymous: false,
            },
        )
        .await
        .unwrap();

        match recv(&mut rx).await {
            ServerEvent::Error { code, event, .. } => {
                assert_eq!(code, "VALIDATION_ERROR");
                assert_eq!(event.as_deref(), Some("create_question"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_length_limit() {
        let store = Arc::new(InMemorySessionStore::new());
        let mentor = Identity::mentor(UserId::new());
        let session = seeded_session(&store, mentor.user_id).await;
        let (room, _task) =
            RoomActor::spawn(session.clone(), store.clone(), SETTINGS, CancellationToken::new());

        let (conn, mut rx) = ConnectionHandle::new(16);
        let conn_id = conn.id();
        room.connect(mentor, conn).await.unwrap();
        recv(&mut rx).await;

        room.send_event(
            conn_id,
            ClientEvent::SendMessage {
                body: "x".repeat(51),
                visibility: Visibility::Public,
                recipient_id: None,
                reply_to: None,
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            recv(&mut rx).await,
            ServerEvent::Error { ref code, .. } if code == "VALIDATION_ERROR"
        ));
        assert!(store.chat_messages(session.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_broadcast() {
        let store = Arc::new(InMemorySessionStore::new());
        let mentor = Identity::mentor(UserId::new());
        let session = seeded_session(&store, mentor.user_id).await;
        let (room, _task) =
            RoomActor::spawn(session, store.clone(), SETTINGS, CancellationToken::new());

        let (mentor_conn, mut mentor_rx) = ConnectionHandle::new(16);
        let mentor_conn_id = mentor_conn.id();
        room.connect(mentor, mentor_conn).await.unwrap();
        recv(&mut mentor_rx).await;

        let (student_conn, mut student_rx) = ConnectionHandle::new(16);
        room.connect(Identity::student(UserId::new()), student_conn)
            .await
            .unwrap();
        recv(&mut student_rx).await;
        recv(&mut mentor_rx).await; // presence

        store.set_fail_chat_writes(true);
        room.send_event(
            mentor_conn_id,
            ClientEvent::SendMessage {
                body: "hello".to_string(),
                visibility: Visibility::Public,
                recipient_id: None,
                reply_to: None,
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            recv(&mut mentor_rx).await,
            ServerEvent::Error { ref code, .. } if code == "PERSISTENCE_FAILURE"
        ));
        // Round-trip through the mailbox so the event above is fully processed.
        room.get_state().await.unwrap();
        assert!(student_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_closes_members() {
        let store = Arc::new(InMemorySessionStore::new());
        let mentor = Identity::mentor(UserId::new());
        let session = seeded_session(&store, mentor.user_id).await;
        let token = CancellationToken::new();
        let (room, task) = RoomActor::spawn(session, store, SETTINGS, token.clone());

        let (conn, _rx) = ConnectionHandle::new(16);
        room.connect(mentor, conn.clone()).await.unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(conn.is_closed());
        assert!(room.is_cancelled());
    }
}
