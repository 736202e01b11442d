//! # SC Test Utilities
//!
//! Shared test utilities for the Session Controller.
//!
//! This crate provides:
//! - Seeded in-memory classrooms (`TestClassroom`, `TestSession`)
//! - A fully wired service stack with mock provider and verifier
//!   (`TestServices`)
//! - Room event helpers (`next_event`, `assert_no_event`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let services = TestServices::new();
//!     let student = services.classroom.enroll_student();
//!     let session = services.classroom.seed_session(TestSession::live_now()).await;
//!
//!     let joined = services.state.admission.join(&student, session.id).await?;
//!     assert_eq!(joined.session_status, SessionStatus::Live);
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod fixtures;
pub mod harness;

pub use events::*;
pub use fixtures::*;
pub use harness::*;
