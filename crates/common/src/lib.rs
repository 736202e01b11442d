//! Common types shared across the live-session components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for identifiers and verified caller identity
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
