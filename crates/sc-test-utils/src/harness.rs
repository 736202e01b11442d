//! Fully wired service stack for integration tests.
//!
//! Uses the in-memory store, `MockMeetingProvider` and a static identity
//! verifier, so tests run without a database or network.

use crate::fixtures::TestClassroom;
use common::types::Identity;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use session_controller::config::Config;
use session_controller::observability::metrics::init_metrics_recorder;
use session_controller::routes::{self, AppState};
use session_controller::services::identity::mock::StaticIdentityVerifier;
use session_controller::services::meeting_provider::mock::MockMeetingProvider;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Global metrics handle; the recorder can only be installed once per process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Config built from defaults plus `overrides`.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_vars(&vars).expect("test config must be valid")
}

/// Services, store and mocks wired together.
pub struct TestServices {
    pub state: Arc<AppState>,
    pub classroom: TestClassroom,
    pub provider: Arc<MockMeetingProvider>,
    pub verifier: Arc<StaticIdentityVerifier>,
    registry_task: JoinHandle<()>,
}

impl Default for TestServices {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServices {
    /// Accepting provider and default config.
    pub fn new() -> Self {
        Self::build(MockMeetingProvider::accepting(), test_config(&[]))
    }

    pub fn with_provider(provider: MockMeetingProvider) -> Self {
        Self::build(provider, test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(MockMeetingProvider::accepting(), config)
    }

    fn build(provider: MockMeetingProvider, config: Config) -> Self {
        let classroom = TestClassroom::new();
        let provider = Arc::new(provider);
        let verifier = Arc::new(StaticIdentityVerifier::new());

        let (state, registry_task) = AppState::new(
            config,
            classroom.store.clone(),
            provider.clone(),
            verifier.clone(),
        );

        Self {
            state: Arc::new(state),
            classroom,
            provider,
            verifier,
            registry_task,
        }
    }

    /// Register and return a bearer token for `identity`.
    pub fn token_for(&self, identity: &Identity) -> String {
        let token = format!("token-{}", identity.user_id);
        self.verifier.insert(token.clone(), *identity);
        token
    }

    /// The production router over this stack.
    pub fn router(&self) -> axum::Router {
        routes::build_routes(self.state.clone(), test_metrics_handle())
    }
}

impl Drop for TestServices {
    fn drop(&mut self) {
        self.state.rooms.shutdown();
        self.registry_task.abort();
    }
}
