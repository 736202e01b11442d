//! `RoomRegistry` - supervisor for per-session rooms.
//!
//! The registry owns the `SessionId -> RoomActor` map. Rooms are spawned on
//! the first connection and pruned when the last connection leaves or the
//! session reaches a terminal status. Lifecycle and admission code reach
//! rooms only through [`RoomRegistryHandle::session_updated`].

use super::connection::ConnectionHandle;
use super::messages::{RegistryMessage, RegistryStatus, RoomState};
use super::room::{RoomActor, RoomHandle, RoomSettings};
use crate::errors::ScError;
use crate::models::Session;
use crate::observability::metrics;
use crate::repositories::SessionStore;
use common::types::{ConnectionId, Identity, SessionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `RoomRegistry` actor.
#[derive(Clone, Debug)]
pub struct RoomRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryHandle {
    /// Spawn the registry actor.
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        settings: RoomSettings,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistry {
            receiver,
            cancel_token: cancel_token.clone(),
            store,
            settings,
            rooms: HashMap::new(),
        };
        let task_handle = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    /// Attach a connection to the session's room.
    ///
    /// # Errors
    ///
    /// - `ScError::SessionUnavailable` if the session has ended
    /// - `ScError::Internal` if the registry is not running
    pub async fn connect(
        &self,
        session: Session,
        identity: Identity,
        connection: ConnectionHandle,
    ) -> Result<RoomHandle, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Connect {
                session,
                identity,
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn disconnect(
        &self,
        session_id: SessionId,
        connection_id: ConnectionId,
    ) -> Result<(), ScError> {
        self.sender
            .send(RegistryMessage::Disconnect {
                session_id,
                connection_id,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Tell the session's room about a persisted lifecycle change.
    pub async fn session_updated(&self, session: Session) -> Result<(), ScError> {
        self.sender
            .send(RegistryMessage::SessionUpdated { session })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// State of one room, or `None` if the session has no open room.
    pub async fn room_state(&self, session_id: SessionId) -> Result<Option<RoomState>, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::RoomState {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn status(&self) -> Result<RegistryStatus, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the registry and every room it supervises.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

struct ManagedRoom {
    handle: RoomHandle,
    task_handle: JoinHandle<()>,
    connections: HashSet<ConnectionId>,
}

/// The `RoomRegistry` actor implementation.
pub struct RoomRegistry {
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    store: Arc<dyn SessionStore>,
    settings: RoomSettings,
    rooms: HashMap<SessionId, ManagedRoom>,
}

impl RoomRegistry {
    #[instrument(skip_all, name = "sc.actor.registry")]
    async fn run(mut self) {
        info!(target: "sc.actor.registry", "RoomRegistry started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.registry",
                        rooms = self.rooms.len(),
                        "RoomRegistry shutting down"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                }
            }
        }

        self.shutdown_rooms().await;
        info!(target: "sc.actor.registry", "RoomRegistry stopped");
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Connect {
                session,
                identity,
                connection,
                respond_to,
            } => {
                let result = self.handle_connect(session, identity, connection).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::Disconnect {
                session_id,
                connection_id,
            } => self.handle_disconnect(session_id, connection_id).await,

            RegistryMessage::SessionUpdated { session } => {
                self.handle_session_updated(session).await;
            }

            RegistryMessage::RoomState {
                session_id,
                respond_to,
            } => {
                let state = match self.rooms.get(&session_id) {
                    Some(room) => room.handle.get_state().await.ok(),
                    None => None,
                };
                let _ = respond_to.send(state);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    room_count: self.rooms.len(),
                    connection_count: self.rooms.values().map(|r| r.connections.len()).sum(),
                });
            }
        }
    }

    async fn handle_connect(
        &mut self,
        session: Session,
        identity: Identity,
        connection: ConnectionHandle,
    ) -> Result<RoomHandle, ScError> {
        if session.status.is_terminal() {
            return Err(ScError::SessionUnavailable(
                "Session has ended".to_string(),
            ));
        }

        let session_id = session.id;
        let stale = self
            .rooms
            .get(&session_id)
            .is_some_and(|room| room.task_handle.is_finished());
        if stale {
            self.rooms.remove(&session_id);
        }

        let room = self.rooms.entry(session_id).or_insert_with(|| {
            let (handle, task_handle) = RoomActor::spawn(
                session,
                Arc::clone(&self.store),
                self.settings,
                self.cancel_token.child_token(),
            );
            debug!(target: "sc.actor.registry", session_id = %session_id, "Room created");
            ManagedRoom {
                handle,
                task_handle,
                connections: HashSet::new(),
            }
        });

        let connection_id = connection.id();
        let result = room.handle.connect(identity, connection).await;
        match result {
            Ok(()) => {
                room.connections.insert(connection_id);
                metrics::increment_room_connections();
                let handle = room.handle.clone();
                metrics::set_active_rooms(self.rooms.len());
                Ok(handle)
            }
            Err(e) => {
                if room.connections.is_empty() {
                    self.remove_room(session_id);
                }
                Err(e)
            }
        }
    }

    async fn handle_disconnect(&mut self, session_id: SessionId, connection_id: ConnectionId) {
        let Some(room) = self.rooms.get_mut(&session_id) else {
            return;
        };
        if !room.connections.remove(&connection_id) {
            return;
        }
        metrics::decrement_room_connections();

        if let Err(e) = room.handle.disconnect(connection_id).await {
            warn!(
                target: "sc.actor.registry",
                session_id = %session_id,
                error = %e,
                "Failed to forward disconnect to room"
            );
        }

        if room.connections.is_empty() {
            debug!(target: "sc.actor.registry", session_id = %session_id, "Last connection left, closing room");
            self.remove_room(session_id);
        }
    }

    async fn handle_session_updated(&mut self, session: Session) {
        let session_id = session.id;
        let terminal = session.status.is_terminal();
        let Some(room) = self.rooms.get(&session_id) else {
            return;
        };

        if let Err(e) = room.handle.session_updated(session).await {
            warn!(
                target: "sc.actor.registry",
                session_id = %session_id,
                error = %e,
                "Failed to forward session update to room"
            );
        }

        if terminal {
            info!(target: "sc.actor.registry", session_id = %session_id, "Session ended, room closed");
            // The room exits on its own once it has broadcast the final status.
            if let Some(room) = self.rooms.remove(&session_id) {
                for _ in &room.connections {
                    metrics::decrement_room_connections();
                }
            }
            metrics::set_active_rooms(self.rooms.len());
        }
    }

    /// Cancel and forget a room.
    fn remove_room(&mut self, session_id: SessionId) {
        if let Some(room) = self.rooms.remove(&session_id) {
            room.handle.cancel();
            for _ in &room.connections {
                metrics::decrement_room_connections();
            }
        }
        metrics::set_active_rooms(self.rooms.len());
    }

    async fn shutdown_rooms(&mut self) {
        for (session_id, room) in self.rooms.drain() {
            room.handle.cancel();
            if let Err(e) = room.task_handle.await {
                warn!(
                    target: "sc.actor.registry",
                    session_id = %session_id,
                    error = %e,
                    "Room task ended abnormally"
                );
            }
        }
        metrics::set_active_rooms(0);
    }
}
