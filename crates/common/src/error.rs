//! Common error types for parsing shared values.

use thiserror::Error;

/// Errors produced when parsing identifiers or roles from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The value is not a valid identifier.
    #[error("Invalid {kind} identifier: {value}")]
    InvalidId {
        /// Identifier kind (e.g. "session").
        kind: &'static str,
        /// Offending input.
        value: String,
    },

    /// The value is not a known role.
    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
