//! Service layer for the Session Controller.
//!
//! # Components
//!
//! - `lifecycle` - session create saga, edits and the status state machine
//! - `admission` - per-session serialized join/leave
//! - `meeting_provider` - HTTP client for the external meeting provider
//! - `identity` - black-box credential verification

pub mod admission;
pub mod identity;
pub mod lifecycle;
pub mod meeting_provider;

pub use admission::AdmissionController;
pub use identity::{HttpIdentityVerifier, IdentityVerifier};
pub use lifecycle::SessionLifecycle;
pub use meeting_provider::{HttpMeetingProvider, MeetingProvider};

/// Shared message for missing and not-owned sessions.
pub(crate) const SESSION_NOT_FOUND_OR_DENIED: &str = "Session not found or access denied";
