//! Observability module for the Session Controller.
//!
//! Provides metrics definitions and instrumentation helpers.

pub mod metrics;
