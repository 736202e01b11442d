//! Metrics definitions for the Session Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `operation`: bounded by code (provider and repository operation names)
//! - `status` / `outcome`: small fixed sets
//! - `event`: client event kinds

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` endpoint.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sc_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Provider calls cross the public internet
        .set_buckets_for_metric(
            Matcher::Prefix("sc_provider_call".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set provider call buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("sc_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `sc_http_requests_total`, `sc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("sc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        100..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Replace session ids in request paths with a placeholder.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/v1/health" | "/metrics" | "/v1/sessions" => return path.to_string(),
        _ => {}
    }

    let parts: Vec<&str> = path.split('/').collect();
    // ["", "v1", "sessions", "{id}", action?]
    if parts.get(1) == Some(&"v1") && parts.get(2) == Some(&"sessions") {
        match (parts.len(), parts.get(4)) {
            (4, _) => return "/v1/sessions/{id}".to_string(),
            (5, Some(action))
                if matches!(*action, "join" | "leave" | "complete" | "attendance" | "ws") =>
            {
                return format!("/v1/sessions/{{id}}/{action}");
            }
            _ => {}
        }
    }

    "/other".to_string()
}

// ============================================================================
// Session Lifecycle Metrics
// ============================================================================

/// Record the outcome of a create-session request.
///
/// Metric: `sc_sessions_created_total`
/// Labels: `status` (`success`, `provider_failure`, `persistence_failure`, `rejected`)
pub fn record_session_created(status: &str) {
    counter!("sc_sessions_created_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a compensating remote cancel.
///
/// Metric: `sc_compensations_total`
/// Labels: `outcome` (`success`, `error`)
pub fn record_compensation(outcome: &str) {
    counter!("sc_compensations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Provider Metrics
// ============================================================================

/// Record a meeting provider call.
///
/// Metric: `sc_provider_calls_total`, `sc_provider_call_duration_seconds`
/// Labels: `operation` (`create`, `update`, `cancel`, `resolve_link`), `status`
pub fn record_provider_call(operation: &str, status: &str, duration: Duration) {
    histogram!("sc_provider_call_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sc_provider_calls_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record an admission decision.
///
/// Metric: `sc_admissions_total`
/// Labels: `outcome` (`admitted`, `rejoined`, `capacity_exceeded`,
/// `not_enrolled`, `session_unavailable`, `error`)
pub fn record_admission(outcome: &str) {
    counter!("sc_admissions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ============================================================================
// Room Metrics
// ============================================================================

/// Record a processed client event.
///
/// Metric: `sc_room_events_total`
/// Labels: `event`, `outcome` (`accepted`, `rejected`, `error`)
pub fn record_room_event(event: &str, outcome: &str) {
    counter!("sc_room_events_total",
        "event" => event.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the number of rooms with at least one connection.
///
/// Metric: `sc_active_rooms`
pub fn set_active_rooms(count: usize) {
    gauge!("sc_active_rooms").set(count as f64);
}

/// Adjust the number of live socket connections across all rooms.
///
/// Metric: `sc_room_connections`
pub fn increment_room_connections() {
    gauge!("sc_room_connections").increment(1.0);
}

/// See [`increment_room_connections`].
pub fn decrement_room_connections() {
    gauge!("sc_room_connections").decrement(1.0);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `sc_db_query_duration_seconds`, `sc_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("sc_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sc_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against the global no-op recorder; they exercise the label
    // construction paths only.

    #[test]
    fn test_record_functions_do_not_panic() {
        record_http_request("GET", "/v1/health", 200, Duration::from_millis(2));
        record_http_request("POST", "/v1/sessions", 502, Duration::from_millis(900));
        record_session_created("success");
        record_session_created("persistence_failure");
        record_compensation("success");
        record_provider_call("create", "success", Duration::from_millis(300));
        record_provider_call("cancel", "error", Duration::from_secs(10));
        record_admission("admitted");
        record_admission("capacity_exceeded");
        record_room_event("send_message", "accepted");
        record_room_event("answer_question", "rejected");
        set_active_rooms(3);
        increment_room_connections();
        decrement_room_connections();
        record_db_query("admit_attendee", "success", Duration::from_millis(4));
    }

    #[test]
    fn test_admission_and_compensation_are_recorded() {
        use metrics_util::debugging::DebuggingRecorder;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_admission("admitted");
            record_admission("capacity_exceeded");
            record_compensation("error");
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "sc_admissions_total"));
        assert!(names.iter().any(|n| n == "sc_compensations_total"));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(101), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(502), "error");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/v1/health"), "/v1/health");
        assert_eq!(normalize_endpoint("/v1/sessions"), "/v1/sessions");
        assert_eq!(
            normalize_endpoint("/v1/sessions/550e8400-e29b-41d4-a716-446655440000"),
            "/v1/sessions/{id}"
        );
        assert_eq!(
            normalize_endpoint("/v1/sessions/550e8400-e29b-41d4-a716-446655440000/join"),
            "/v1/sessions/{id}/join"
        );
        assert_eq!(
            normalize_endpoint("/v1/sessions/abc/ws"),
            "/v1/sessions/{id}/ws"
        );
        assert_eq!(normalize_endpoint("/v1/sessions/abc/unknown"), "/other");
        assert_eq!(normalize_endpoint("/admin"), "/other");
    }
}
