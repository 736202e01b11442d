//! Session Controller error types.
//!
//! Every rejection carries a stable machine-readable code (`error_code`) so the
//! HTTP and socket boundaries can map it without string matching. Messages
//! returned to clients for infrastructure failures are generic; the detail is
//! logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Session Controller error type.
///
/// Maps to HTTP status codes:
/// - ProviderFailure: 502 Bad Gateway
/// - PersistenceFailure, Internal: 500 Internal Server Error
/// - AccessDenied, NotEnrolled: 403 Forbidden
/// - NotFound: 404 Not Found
/// - SessionUnavailable, CapacityExceeded, Conflict: 409 Conflict
/// - Validation: 400 Bad Request
/// - IntegrationRequired: 412 Precondition Failed
/// - Unauthenticated: 401 Unauthorized
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScError {
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Not enrolled in the session's course")]
    NotEnrolled,

    #[error("Session is at capacity")]
    CapacityExceeded,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Meeting provider integration required")]
    IntegrationRequired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ScError::ProviderFailure(_) => 502,
            ScError::PersistenceFailure(_) | ScError::Internal(_) => 500,
            ScError::AccessDenied(_) | ScError::NotEnrolled => 403,
            ScError::NotFound(_) => 404,
            ScError::SessionUnavailable(_) | ScError::CapacityExceeded | ScError::Conflict(_) => {
                409
            }
            ScError::Validation(_) => 400,
            ScError::IntegrationRequired => 412,
            ScError::Unauthenticated(_) => 401,
            ScError::ServiceUnavailable(_) => 503,
        }
    }

    /// Stable error code shared by HTTP responses and socket error events.
    pub fn error_code(&self) -> &'static str {
        match self {
            ScError::ProviderFailure(_) => "PROVIDER_FAILURE",
            ScError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            ScError::AccessDenied(_) => "ACCESS_DENIED",
            ScError::NotFound(_) => "NOT_FOUND",
            ScError::SessionUnavailable(_) => "SESSION_UNAVAILABLE",
            ScError::NotEnrolled => "NOT_ENROLLED",
            ScError::CapacityExceeded => "CAPACITY_EXCEEDED",
            ScError::Validation(_) => "VALIDATION_ERROR",
            ScError::IntegrationRequired => "INTEGRATION_REQUIRED",
            ScError::Conflict(_) => "CONFLICT",
            ScError::Unauthenticated(_) => "UNAUTHENTICATED",
            ScError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ScError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to a client.
    ///
    /// Infrastructure failures collapse to a generic sentence; domain
    /// rejections keep their specific reason.
    pub fn client_message(&self) -> String {
        match self {
            ScError::ProviderFailure(_) => "Meeting provider request failed".to_string(),
            ScError::PersistenceFailure(_) => "An internal database error occurred".to_string(),
            ScError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
            ScError::Internal(_) => "An internal error occurred".to_string(),
            ScError::NotEnrolled => "You are not enrolled in this course".to_string(),
            ScError::CapacityExceeded => "This session is full".to_string(),
            ScError::IntegrationRequired => {
                "Connect a meeting provider account before scheduling sessions".to_string()
            }
            ScError::AccessDenied(reason)
            | ScError::NotFound(reason)
            | ScError::SessionUnavailable(reason)
            | ScError::Validation(reason)
            | ScError::Conflict(reason)
            | ScError::Unauthenticated(reason) => reason.clone(),
        }
    }

    /// Log the server-side detail for infrastructure failures.
    fn log_detail(&self) {
        match self {
            ScError::ProviderFailure(detail) => {
                tracing::warn!(target: "sc.errors", error = %detail, "Meeting provider failure");
            }
            ScError::PersistenceFailure(detail) => {
                tracing::error!(target: "sc.errors", error = %detail, "Persistence failure");
            }
            ScError::ServiceUnavailable(detail) => {
                tracing::warn!(target: "sc.errors", reason = %detail, "Service unavailable");
            }
            ScError::Internal(detail) => {
                tracing::error!(target: "sc.errors", error = %detail, "Internal error");
            }
            _ => {}
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ScError {
    fn into_response(self) -> Response {
        self.log_detail();

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"live-sessions\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to ScError
impl From<sqlx::Error> for ScError {
    fn from(err: sqlx::Error) -> Self {
        ScError::PersistenceFailure(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ScError::NotFound("session".to_string()).to_string(),
            "Not found: session"
        );
        assert_eq!(
            ScError::CapacityExceeded.to_string(),
            "Session is at capacity"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ScError::ProviderFailure("x".into()).status_code(), 502);
        assert_eq!(ScError::PersistenceFailure("x".into()).status_code(), 500);
        assert_eq!(ScError::AccessDenied("x".into()).status_code(), 403);
        assert_eq!(ScError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ScError::SessionUnavailable("x".into()).status_code(), 409);
        assert_eq!(ScError::NotEnrolled.status_code(), 403);
        assert_eq!(ScError::CapacityExceeded.status_code(), 409);
        assert_eq!(ScError::Validation("x".into()).status_code(), 400);
        assert_eq!(ScError::IntegrationRequired.status_code(), 412);
        assert_eq!(ScError::Conflict("x".into()).status_code(), 409);
        assert_eq!(ScError::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(ScError::ServiceUnavailable("x".into()).status_code(), 503);
        assert_eq!(ScError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            ScError::ProviderFailure(String::new()),
            ScError::PersistenceFailure(String::new()),
            ScError::AccessDenied(String::new()),
            ScError::NotFound(String::new()),
            ScError::SessionUnavailable(String::new()),
            ScError::NotEnrolled,
            ScError::CapacityExceeded,
            ScError::Validation(String::new()),
            ScError::IntegrationRequired,
            ScError::Conflict(String::new()),
            ScError::Unauthenticated(String::new()),
            ScError::ServiceUnavailable(String::new()),
            ScError::Internal(String::new()),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(ScError::error_code).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_client_message_hides_infrastructure_detail() {
        let err = ScError::PersistenceFailure("relation live_sessions does not exist".into());
        assert!(!err.client_message().contains("live_sessions"));

        let err = ScError::ProviderFailure("HTTP 500 from provider.internal".into());
        assert!(!err.client_message().contains("provider.internal"));
    }

    #[tokio::test]
    async fn test_into_response_capacity_exceeded() {
        let response = ScError::CapacityExceeded.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED");
        assert_eq!(body["error"]["message"], "This session is full");
    }

    #[tokio::test]
    async fn test_into_response_validation_keeps_reason() {
        let response =
            ScError::Validation("Scheduled end must be after start".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(
            body["error"]["message"],
            "Scheduled end must be after start"
        );
    }

    #[tokio::test]
    async fn test_into_response_unauthenticated_sets_challenge() {
        let response = ScError::Unauthenticated("Missing credentials".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let www_auth = response.headers().get("WWW-Authenticate").unwrap();
        assert!(www_auth.to_str().unwrap().starts_with("Bearer"));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_into_response_persistence_is_generic() {
        let response = ScError::PersistenceFailure("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "PERSISTENCE_FAILURE");
        assert_eq!(
            body["error"]["message"],
            "An internal database error occurred"
        );
    }
}
