//! HTTP request handlers for the Session Controller.

pub mod health;
pub mod metrics;
pub mod realtime;
pub mod sessions;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use realtime::session_socket;
pub use sessions::{
    cancel_session, complete_session, create_session, get_session, join_session,
    leave_session, list_attendance, update_session,
};
