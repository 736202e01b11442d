//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// Pings the session store and reports the result. Always answers 200 so
/// probes can read the body.
///
/// ```json
/// { "status": "healthy", "store": "healthy" }
/// ```
#[instrument(skip_all, name = "sc.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_healthy = state.store.ping().await.is_ok();
    let label = if store_healthy { "healthy" } else { "unhealthy" };

    Json(HealthResponse {
        status: label.to_string(),
        store: label.to_string(),
    })
}
