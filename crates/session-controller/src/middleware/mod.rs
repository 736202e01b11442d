//! Middleware for the Session Controller.
//!
//! # Components
//!
//! - `auth` - Caller verification for protected routes
//! - `http_metrics` - Request counters and latency histograms

pub mod auth;
pub mod http_metrics;

pub use auth::require_auth;
pub use http_metrics::http_metrics_middleware;
