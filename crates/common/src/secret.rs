//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Provider access tokens and caller
//! credentials are held as `SecretString` so that any struct deriving
//! `Debug` prints `[REDACTED]` instead of the value.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ProviderCredentials {
//!     account: String,
//!     access_token: SecretString,
//! }
//!
//! let creds = ProviderCredentials {
//!     account: "mentor@example.com".to_string(),
//!     access_token: SecretString::from("ya29.token"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("ya29.token"));
//! assert_eq!(creds.access_token.expose_secret(), "ya29.token");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
