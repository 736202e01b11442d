//! Per-socket connection handle.
//!
//! A `ConnectionHandle` is the room's view of one socket: a bounded outbound
//! queue plus a cancellation token. The socket's writer task drains the
//! queue; the room never awaits a slow socket.

use super::messages::ServerEvent;
use common::types::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to one connected socket.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<ServerEvent>,
    cancel_token: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains.
    ///
    /// `buffer` bounds the outbound queue; a connection that lets it fill is
    /// dropped from its room.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            sender,
            cancel_token: CancellationToken::new(),
        };
        (handle, receiver)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event without waiting.
    ///
    /// Returns `false` if the queue is full or the socket is gone.
    pub fn try_deliver(&self, event: ServerEvent) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(
                    target: "sc.actor.connection",
                    connection_id = %self.id,
                    "Outbound queue full"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the connection. The socket task observes the token and exits.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token the socket task selects on.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn typing() -> ServerEvent {
        ServerEvent::Typing {
            user_id: common::types::UserId::new(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn test_delivers_until_full() {
        let (handle, mut receiver) = ConnectionHandle::new(2);
        assert!(handle.try_deliver(typing()));
        assert!(handle.try_deliver(typing()));
        assert!(!handle.try_deliver(typing()));

        receiver.recv().await.unwrap();
        assert!(handle.try_deliver(typing()));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_delivery() {
        let (handle, _receiver) = ConnectionHandle::new(4);
        handle.close();
        assert!(handle.is_closed());
        assert!(!handle.try_deliver(typing()));
    }

    #[tokio::test]
    async fn test_dropped_receiver_rejects_delivery() {
        let (handle, receiver) = ConnectionHandle::new(4);
        drop(receiver);
        assert!(!handle.try_deliver(typing()));
    }
}
