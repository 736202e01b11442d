//! Caller identity verification.
//!
//! Credentials are verified by the marketplace's auth service; this module
//! only forwards the bearer token and maps the verdict onto an [`Identity`].
//! The core never inspects tokens itself.

use crate::errors::ScError;
use common::types::{Identity, Role, UserId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Black-box credential verifier.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve a bearer token to a verified identity.
    ///
    /// # Errors
    ///
    /// - `ScError::Unauthenticated` if the token is rejected
    /// - `ScError::ServiceUnavailable` if the verifier cannot be reached
    async fn verify(&self, token: &str) -> Result<Identity, ScError>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    user_id: UserId,
    role: Role,
}

/// Verifier that calls the auth service over HTTP.
#[derive(Clone)]
pub struct HttpIdentityVerifier {
    client: Client,
    verify_url: String,
}

impl HttpIdentityVerifier {
    /// # Errors
    ///
    /// Returns `ScError::Internal` if the HTTP client cannot be built.
    pub fn new(verify_url: String, timeout: Duration) -> Result<Self, ScError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "sc.services.identity", error = %e, "Failed to build HTTP client");
                ScError::Internal(format!("failed to build identity client: {e}"))
            })?;

        Ok(Self { client, verify_url })
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[instrument(skip_all, name = "sc.services.identity.verify")]
    async fn verify(&self, token: &str) -> Result<Identity, ScError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sc.services.identity", error = %e, "Verifier request failed");
                ScError::ServiceUnavailable("Identity verifier is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            let body: VerifyResponse = response.json().await.map_err(|e| {
                error!(target: "sc.services.identity", error = %e, "Failed to parse verifier response");
                ScError::Internal(format!("malformed verifier response: {e}"))
            })?;
            return Ok(Identity {
                user_id: body.user_id,
                role: body.role,
            });
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ScError::Unauthenticated("Invalid or expired token".to_string()))
            }
            s if s.is_server_error() => {
                warn!(target: "sc.services.identity", status = %s, "Verifier returned server error");
                Err(ScError::ServiceUnavailable(
                    "Identity verifier is unavailable".to_string(),
                ))
            }
            s => {
                warn!(target: "sc.services.identity", status = %s, "Unexpected verifier response");
                Err(ScError::Unauthenticated("Invalid or expired token".to_string()))
            }
        }
    }
}

/// Static verifier for tests.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Resolves tokens from a fixed table.
    #[derive(Default)]
    pub struct StaticIdentityVerifier {
        tokens: RwLock<HashMap<String, Identity>>,
    }

    impl StaticIdentityVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register `token` as resolving to `identity`.
        pub fn insert(&self, token: impl Into<String>, identity: Identity) {
            if let Ok(mut tokens) = self.tokens.write() {
                tokens.insert(token.into(), identity);
            }
        }

        /// Builder form of [`Self::insert`].
        pub fn with(self, token: impl Into<String>, identity: Identity) -> Self {
            self.insert(token, identity);
            self
        }
    }

    #[async_trait::async_trait]
    impl IdentityVerifier for StaticIdentityVerifier {
        async fn verify(&self, token: &str) -> Result<Identity, ScError> {
            self.tokens
                .read()
                .ok()
                .and_then(|tokens| tokens.get(token).copied())
                .ok_or_else(|| ScError::Unauthenticated("Invalid or expired token".to_string()))
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_static_verifier() {
            let mentor = Identity::mentor(UserId::new());
            let verifier = StaticIdentityVerifier::new().with("mentor-token", mentor);

            assert_eq!(verifier.verify("mentor-token").await.unwrap(), mentor);
            assert!(matches!(
                verifier.verify("nope").await,
                Err(ScError::Unauthenticated(_))
            ));
        }
    }
}
