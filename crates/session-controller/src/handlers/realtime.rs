//! Real-time room socket.
//!
//! `GET /v1/sessions/{id}/ws` upgrades to a WebSocket attached to the
//! session's room. Each socket runs two halves:
//!
//! - a writer task draining the connection's outbound queue
//! - a reader loop forwarding parsed client events to the room
//!
//! Either half ending (client close, room eviction, session end, shutdown)
//! cancels the connection token and the other half follows.

use super::sessions::parse_session_id;
use crate::actors::{ClientEvent, ConnectionHandle, ServerEvent};
use crate::errors::ScError;
use crate::models::Session;
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
    Extension,
};
use common::types::Identity;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Upgrade to a room socket for a session the caller may see.
///
/// Authorization runs before the upgrade, so rejected callers get an
/// ordinary HTTP error response.
#[instrument(skip_all, name = "sc.handlers.session_socket", fields(session_id = %id))]
pub async fn session_socket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ScError> {
    let session_id = parse_session_id(&id)?;
    let session = state.lifecycle.get_session(&identity, session_id).await?;
    if session.status.is_terminal() {
        return Err(ScError::SessionUnavailable(format!(
            "Session is {}",
            session.status
        )));
    }

    Ok(ws.on_upgrade(move |socket| run_socket(state, identity, session, socket)))
}

async fn run_socket(state: Arc<AppState>, identity: Identity, session: Session, socket: WebSocket) {
    let session_id = session.id;
    let (connection, mut outbound) = ConnectionHandle::new(state.config.room_outbound_buffer);
    let connection_id = connection.id();
    let cancel_token = connection.cancel_token();

    let room = match state
        .rooms
        .connect(session, identity, connection.clone())
        .await
    {
        Ok(room) => room,
        Err(e) => {
            debug!(
                target: "sc.handlers.realtime",
                session_id = %session_id,
                error = %e,
                "Room rejected connection"
            );
            let mut socket = socket;
            let _ = send_event(&mut socket, &ServerEvent::error(&e, None)).await;
            let _ = socket.close().await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let writer_token = cancel_token.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                event = outbound.recv() => match event {
                    Some(event) => {
                        if send_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },

                () = writer_token.cancelled() => {
                    // Flush what the room queued before it closed us.
                    while let Ok(event) = outbound.try_recv() {
                        if send_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        writer_token.cancel();
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if let Err(e) = room.send_event(connection_id, event).await {
                            warn!(
                                target: "sc.handlers.realtime",
                                session_id = %session_id,
                                error = %e,
                                "Room unavailable"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        let error = ScError::Validation(format!("Invalid event: {e}"));
                        connection.try_deliver(ServerEvent::error(&error, None));
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(
                        target: "sc.handlers.realtime",
                        session_id = %session_id,
                        error = %e,
                        "Socket read failed"
                    );
                    break;
                }
            },
        }
    }

    connection.close();
    if let Err(e) = state.rooms.disconnect(session_id, connection_id).await {
        warn!(
            target: "sc.handlers.realtime",
            session_id = %session_id,
            error = %e,
            "Failed to detach connection"
        );
    }
    let _ = writer.await;
}

async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> Result<(), ScError>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(event)
        .map_err(|e| ScError::Internal(format!("event serialization failed: {e}")))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| ScError::Internal(format!("socket send failed: {e}")))
}
