//! Meeting provider adapter.
//!
//! Thin client for the external video-conferencing service that hosts the
//! actual calls. Every call is a single attempt: a failed create is never
//! retried because a retry could leave a duplicate remote meeting.
//!
//! # Security
//!
//! - Each request authenticates with the owning mentor's access token
//! - Tokens are held as `SecretString` and never logged
//! - Timeouts prevent hanging connections

use crate::errors::ScError;
use crate::models::ProviderCredentials;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use common::secret::ExposeSecret;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

/// Default connect timeout in seconds.
const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Remote meeting to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRequest {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendee_emails: Vec<String>,
}

/// Result of a successful remote create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedMeeting {
    pub external_meeting_id: String,
    pub join_link: String,
}

/// Fields to change on an existing remote meeting; `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingUpdate {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Contract consumed by the lifecycle and admission services.
#[async_trait::async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Create a remote meeting.
    async fn create_meeting(
        &self,
        credentials: &ProviderCredentials,
        request: &MeetingRequest,
    ) -> Result<CreatedMeeting, ScError>;

    /// Update an existing remote meeting.
    async fn update_meeting(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
        update: &MeetingUpdate,
    ) -> Result<(), ScError>;

    /// Cancel a remote meeting. Cancelling an already-deleted meeting succeeds.
    async fn cancel_meeting(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
    ) -> Result<(), ScError>;

    /// Look up the current join link of a remote meeting.
    async fn resolve_join_link(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
    ) -> Result<String, ScError>;
}

#[derive(Debug, Serialize)]
struct Attendee<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMeetingBody<'a> {
    title: &'a str,
    description: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    attendees: Vec<Attendee<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateMeetingBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MeetingBody {
    id: String,
    join_url: String,
}

/// HTTP client for the meeting provider's REST API.
#[derive(Clone)]
pub struct HttpMeetingProvider {
    client: Client,
    base_url: Url,
}

impl HttpMeetingProvider {
    /// Create a new provider client.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Internal` if `base_url` is not a valid base URL
    /// or the HTTP client cannot be built.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ScError> {
        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ScError::Internal(format!("invalid provider base URL: {base_url}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "sc.services.provider", error = %e, "Failed to build HTTP client");
                ScError::Internal(format!("failed to build provider client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url,
        })
    }

    /// `{base}/v1/meetings`, with `external_meeting_id` appended as one
    /// percent-encoded path segment when given.
    fn meetings_url(&self, external_meeting_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "meetings"]);
            if let Some(id) = external_meeting_id {
                segments.push(id);
            }
        }
        url
    }

    fn meeting_url(&self, external_meeting_id: &str) -> Url {
        self.meetings_url(Some(external_meeting_id))
    }

    fn bearer(credentials: &ProviderCredentials) -> String {
        format!("Bearer {}", credentials.access_token.expose_secret())
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ScError> {
        let start = Instant::now();
        let result = request.send().await;

        match result {
            Ok(response) => {
                let status = if response.status().is_success() {
                    "success"
                } else {
                    "error"
                };
                metrics::record_provider_call(operation, status, start.elapsed());
                Ok(response)
            }
            Err(e) => {
                let status = if e.is_timeout() { "timeout" } else { "error" };
                metrics::record_provider_call(operation, status, start.elapsed());
                warn!(target: "sc.services.provider", operation, error = %e, "Provider request failed");
                Err(ScError::ProviderFailure(format!("{operation}: {e}")))
            }
        }
    }
}

/// Map a non-success provider response to `ProviderFailure`.
async fn reject(operation: &'static str, response: reqwest::Response) -> ScError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(
        target: "sc.services.provider",
        operation,
        status = %status,
        body = %body,
        "Provider rejected request"
    );
    ScError::ProviderFailure(format!("{operation}: provider returned {status}"))
}

async fn parse_meeting(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<MeetingBody, ScError> {
    response.json::<MeetingBody>().await.map_err(|e| {
        error!(target: "sc.services.provider", operation, error = %e, "Failed to parse provider response");
        ScError::ProviderFailure(format!("{operation}: malformed provider response"))
    })
}

#[async_trait::async_trait]
impl MeetingProvider for HttpMeetingProvider {
    #[instrument(skip_all, name = "sc.provider.create_meeting")]
    async fn create_meeting(
        &self,
        credentials: &ProviderCredentials,
        request: &MeetingRequest,
    ) -> Result<CreatedMeeting, ScError> {
        let body = CreateMeetingBody {
            title: &request.title,
            description: &request.description,
            start_time: request.start,
            end_time: request.end,
            attendees: request
                .attendee_emails
                .iter()
                .map(|email| Attendee { email })
                .collect(),
        };

        let response = self
            .send(
                "create",
                self.client
                    .post(self.meetings_url(None))
                    .header("Authorization", Self::bearer(credentials))
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(reject("create", response).await);
        }

        let meeting = parse_meeting("create", response).await?;
        Ok(CreatedMeeting {
            external_meeting_id: meeting.id,
            join_link: meeting.join_url,
        })
    }

    #[instrument(skip_all, name = "sc.provider.update_meeting", fields(external_meeting_id = %external_meeting_id))]
    async fn update_meeting(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
        update: &MeetingUpdate,
    ) -> Result<(), ScError> {
        let body = UpdateMeetingBody {
            title: update.title.as_deref(),
            start_time: update.start,
            end_time: update.end,
        };

        let response = self
            .send(
                "update",
                self.client
                    .patch(self.meeting_url(external_meeting_id))
                    .header("Authorization", Self::bearer(credentials))
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(reject("update", response).await);
        }
        Ok(())
    }

    #[instrument(skip_all, name = "sc.provider.cancel_meeting", fields(external_meeting_id = %external_meeting_id))]
    async fn cancel_meeting(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
    ) -> Result<(), ScError> {
        let response = self
            .send(
                "cancel",
                self.client
                    .delete(self.meeting_url(external_meeting_id))
                    .header("Authorization", Self::bearer(credentials)),
            )
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(reject("cancel", response).await)
    }

    #[instrument(skip_all, name = "sc.provider.resolve_join_link", fields(external_meeting_id = %external_meeting_id))]
    async fn resolve_join_link(
        &self,
        credentials: &ProviderCredentials,
        external_meeting_id: &str,
    ) -> Result<String, ScError> {
        let response = self
            .send(
                "resolve_link",
                self.client
                    .get(self.meeting_url(external_meeting_id))
                    .header("Authorization", Self::bearer(credentials)),
            )
            .await?;

        if !response.status().is_success() {
            return Err(reject("resolve_link", response).await);
        }
        Ok(parse_meeting("resolve_link", response).await?.join_url)
    }
}

/// Mock provider for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock meeting provider with per-operation failure switches.
    #[derive(Default)]
    pub struct MockMeetingProvider {
        fail_create: bool,
        fail_update: bool,
        fail_cancel: bool,
        fail_resolve: bool,
        cancel_delay: Option<Duration>,
        create_calls: AtomicUsize,
        update_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
        resolve_calls: AtomicUsize,
        cancelled: Mutex<Vec<String>>,
        created: Mutex<Vec<String>>,
    }

    impl MockMeetingProvider {
        /// Create a mock where every call succeeds.
        pub fn accepting() -> Self {
            Self::default()
        }

        /// Create a mock whose `create_meeting` fails.
        pub fn failing() -> Self {
            Self {
                fail_create: true,
                ..Self::default()
            }
        }

        /// Create a mock whose `update_meeting` fails.
        pub fn failing_update() -> Self {
            Self {
                fail_update: true,
                ..Self::default()
            }
        }

        /// Create a mock whose `cancel_meeting` fails.
        pub fn failing_cancel() -> Self {
            Self {
                fail_cancel: true,
                ..Self::default()
            }
        }

        /// Create a mock whose `resolve_join_link` fails.
        pub fn failing_resolve() -> Self {
            Self {
                fail_resolve: true,
                ..Self::default()
            }
        }

        /// Delay every cancel by `delay` before it completes.
        pub fn with_cancel_delay(mut self, delay: Duration) -> Self {
            self.cancel_delay = Some(delay);
            self
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn update_calls(&self) -> usize {
            self.update_calls.load(Ordering::SeqCst)
        }

        pub fn cancel_calls(&self) -> usize {
            self.cancel_calls.load(Ordering::SeqCst)
        }

        pub fn resolve_calls(&self) -> usize {
            self.resolve_calls.load(Ordering::SeqCst)
        }

        /// External ids passed to `cancel_meeting`, in call order.
        pub fn cancelled_ids(&self) -> Vec<String> {
            self.cancelled
                .lock()
                .map(|ids| ids.clone())
                .unwrap_or_default()
        }

        /// External ids returned by `create_meeting`, in call order.
        pub fn created_ids(&self) -> Vec<String> {
            self.created
                .lock()
                .map(|ids| ids.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl MeetingProvider for MockMeetingProvider {
        async fn create_meeting(
            &self,
            _credentials: &ProviderCredentials,
            _request: &MeetingRequest,
        ) -> Result<CreatedMeeting, ScError> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(ScError::ProviderFailure(
                    "Mock provider create error".to_string(),
                ));
            }

            let external_meeting_id = format!("mock-meeting-{n}");
            if let Ok(mut created) = self.created.lock() {
                created.push(external_meeting_id.clone());
            }
            Ok(CreatedMeeting {
                join_link: format!("https://meet.example.com/{external_meeting_id}"),
                external_meeting_id,
            })
        }

        async fn update_meeting(
            &self,
            _credentials: &ProviderCredentials,
            _external_meeting_id: &str,
            _update: &MeetingUpdate,
        ) -> Result<(), ScError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_update {
                return Err(ScError::ProviderFailure(
                    "Mock provider update error".to_string(),
                ));
            }
            Ok(())
        }

        async fn cancel_meeting(
            &self,
            _credentials: &ProviderCredentials,
            external_meeting_id: &str,
        ) -> Result<(), ScError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.cancel_delay {
                tokio::time::sleep(delay).await;
            }
            if let Ok(mut cancelled) = self.cancelled.lock() {
                cancelled.push(external_meeting_id.to_string());
            }
            if self.fail_cancel {
                return Err(ScError::ProviderFailure(
                    "Mock provider cancel error".to_string(),
                ));
            }
            Ok(())
        }

        async fn resolve_join_link(
            &self,
            _credentials: &ProviderCredentials,
            external_meeting_id: &str,
        ) -> Result<String, ScError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolve {
                return Err(ScError::ProviderFailure(
                    "Mock provider resolve error".to_string(),
                ));
            }
            Ok(format!("https://meet.example.com/{external_meeting_id}"))
        }
    }

}
