//! Actor model for the interaction broadcast engine.
//!
//! # Actor Hierarchy
//!
//! ```text
//! RoomRegistry (singleton per process)
//! └── supervises N × RoomActor (one per session with live connections)
//!     └── fans out to M × ConnectionHandle (one per socket)
//! ```
//!
//! # Ordering
//!
//! A room processes its mailbox one message at a time: an event is
//! authorized, validated and persisted before the next one is looked at,
//! and broadcasts are queued to every member in the same order. Outbound
//! delivery never blocks the room; a connection whose queue is full is
//! dropped from the room.
//!
//! # Cancellation
//!
//! The registry owns the root `CancellationToken`; each room runs under a
//! child token, so shutting down the registry closes every room and every
//! socket attached to it.

pub mod connection;
pub mod messages;
pub mod registry;
pub mod room;

pub use connection::ConnectionHandle;
pub use messages::{
    ClientEvent, ParticipantInfo, QuestionView, RegistryStatus, RoleRequirement, RoomState,
    ServerEvent,
};
pub use registry::RoomRegistryHandle;
pub use room::{RoomHandle, RoomSettings};
