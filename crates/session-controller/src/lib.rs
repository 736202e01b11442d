//! Session Controller Library
//!
//! Live-session orchestration for the course marketplace: scheduling
//! sessions against an external meeting provider, admitting students under
//! a hard capacity limit, and running the per-session real-time room
//! (chat, Q&A, polls, presence).
//!
//! # Modules
//!
//! - `actors` - Room registry and per-session room actors
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `handlers` - HTTP and socket handlers
//! - `middleware` - Authentication and HTTP metrics
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Session store gateway
//! - `routes` - Router and application state
//! - `services` - Lifecycle, admission and external clients

pub mod actors;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
