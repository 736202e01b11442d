//! Authentication middleware for protected routes.
//!
//! Resolves the caller's bearer credential through the configured
//! [`IdentityVerifier`](crate::services::IdentityVerifier) and stores the verified
//! [`Identity`](common::types::Identity) in request
//! extensions. Handlers only ever see `(user_id, role)`.

use crate::errors::ScError;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Query parameter accepted on socket upgrades, where browsers cannot set
/// an `Authorization` header.
const TOKEN_QUERY_PARAM: &str = "access_token";

/// Require a verified caller.
///
/// # Credential sources
///
/// ```text
/// Authorization: Bearer <token>
/// GET /v1/sessions/{id}/ws?access_token=<token>
/// ```
///
/// Returns 401 with `WWW-Authenticate` when the credential is missing or
/// rejected.
#[instrument(skip_all, name = "sc.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ScError> {
    let token = bearer_token(&req).ok_or_else(|| {
        tracing::debug!(target: "sc.middleware.auth", "Missing credential");
        ScError::Unauthenticated("Missing Authorization header".to_string())
    })?;

    let identity = state.identity.verify(&token).await?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == TOKEN_QUERY_PARAM && !value.is_empty()).then(|| value.to_string())
        })
    })
}
