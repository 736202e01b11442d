//! Helpers for reading room events off a connection queue.

use session_controller::actors::ServerEvent;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

/// How long to wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive the next event, failing the test on timeout or closed queue.
pub async fn next_event(receiver: &mut Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, receiver.recv())
        .await
        .expect("timed out waiting for room event")
        .expect("connection queue closed")
}

/// Skip events until one matches `predicate`.
pub async fn next_matching<F>(receiver: &mut Receiver<ServerEvent>, predicate: F) -> ServerEvent
where
    F: Fn(&ServerEvent) -> bool,
{
    loop {
        let event = next_event(receiver).await;
        if predicate(&event) {
            return event;
        }
    }
}

/// Assert the queue is empty right now.
pub fn assert_no_event(receiver: &mut Receiver<ServerEvent>) {
    if let Ok(event) = receiver.try_recv() {
        panic!("expected no event, got {event:?}");
    }
}
