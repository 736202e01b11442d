//! HTTP routes for the Session Controller.
//!
//! Defines the Axum router and application state.

use crate::actors::{RoomRegistryHandle, RoomSettings};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth};
use crate::repositories::SessionStore;
use crate::services::{AdmissionController, IdentityVerifier, MeetingProvider, SessionLifecycle};
use axum::{
    body::Body,
    extract::Request,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Span;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Session store gateway.
    pub store: Arc<dyn SessionStore>,

    pub lifecycle: Arc<SessionLifecycle>,

    pub admission: Arc<AdmissionController>,

    /// Room registry for real-time connections.
    pub rooms: RoomRegistryHandle,

    /// Black-box credential verifier.
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Wire services around a store, provider and verifier.
    ///
    /// Spawns the room registry; the returned join handle completes after
    /// `rooms.shutdown()`.
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn MeetingProvider>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> (Self, JoinHandle<()>) {
        let (rooms, registry_task) = RoomRegistryHandle::spawn(
            Arc::clone(&store),
            RoomSettings {
                chat_max_length: config.chat_max_length,
            },
        );

        let lifecycle = Arc::new(SessionLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            rooms.clone(),
        ));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&store),
            provider,
            rooms.clone(),
        ));

        let state = Self {
            config,
            store,
            lifecycle,
            admission,
            rooms,
            identity,
        };
        (state, registry_task)
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/health` - Store reachability (public)
/// - `/metrics` - Prometheus metrics endpoint (public)
/// - `/v1/sessions` - Create a session (mentor)
/// - `/v1/sessions/:id` - Get, edit or cancel a session
/// - `/v1/sessions/:id/complete` - End a live session (mentor)
/// - `/v1/sessions/:id/join`, `/leave` - Admission (student)
/// - `/v1/sessions/:id/attendance` - Roster (mentor)
/// - `/v1/sessions/:id/ws` - Real-time room socket
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout on HTTP routes (not on the socket)
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected HTTP routes
    let api_routes = Router::new()
        .route("/v1/sessions", post(handlers::create_session))
        .route(
            "/v1/sessions/:id",
            get(handlers::get_session)
                .patch(handlers::update_session)
                .delete(handlers::cancel_session),
        )
        .route("/v1/sessions/:id/complete", post(handlers::complete_session))
        .route("/v1/sessions/:id/join", post(handlers::join_session))
        .route("/v1/sessions/:id/leave", post(handlers::leave_session))
        .route("/v1/sessions/:id/attendance", get(handlers::list_attendance))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    // Socket upgrade is long-lived, so it sits outside the timeout layer.
    let socket_routes = Router::new()
        .route("/v1/sessions/:id/ws", get(handlers::session_socket))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - Log request details
    // 2. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(api_routes)
        .merge(socket_routes)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Span for one HTTP request. Records the path without the query string,
/// which may hold a socket credential.
fn request_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}
