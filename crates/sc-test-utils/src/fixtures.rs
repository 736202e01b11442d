//! Seeded data for the in-memory session store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::types::{CourseId, Identity, SessionId, UserId};
use session_controller::models::{CreateSessionRequest, NewSession, Session};
use session_controller::repositories::{InMemorySessionStore, SessionStore};
use std::sync::Arc;

/// A fixed instant on 2024-12-15 at `hour:00` UTC.
pub fn fixed_instant(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 15, hour, 0, 0).unwrap()
}

/// One course owned by one mentor with an active provider integration.
#[derive(Clone)]
pub struct TestClassroom {
    pub store: Arc<InMemorySessionStore>,
    pub mentor: Identity,
    pub course_id: CourseId,
}

impl Default for TestClassroom {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClassroom {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemorySessionStore::new()))
    }

    /// Seed a course, its mentor and the mentor's integration into `store`.
    pub fn with_store(store: Arc<InMemorySessionStore>) -> Self {
        let mentor = Identity::mentor(UserId::new());
        let course_id = CourseId::new();
        store.add_course(course_id, mentor.user_id).unwrap();
        store
            .add_integration(mentor.user_id, "provider-access-token")
            .unwrap();
        Self {
            store,
            mentor,
            course_id,
        }
    }

    /// A new student with an active enrollment in the course.
    pub fn enroll_student(&self) -> Identity {
        let student = Identity::student(UserId::new());
        self.store.enroll(self.course_id, student.user_id).unwrap();
        student
    }

    /// A student with no enrollment.
    pub fn outsider(&self) -> Identity {
        Identity::student(UserId::new())
    }

    /// A mentor who does not own the course.
    pub fn other_mentor(&self) -> Identity {
        Identity::mentor(UserId::new())
    }

    /// A valid create request for this course, 10:00-11:00 on the fixed day.
    pub fn create_request(&self) -> CreateSessionRequest {
        CreateSessionRequest {
            course_id: self.course_id,
            title: "Ownership and borrowing".to_string(),
            description: "Live walkthrough".to_string(),
            scheduled_start: fixed_instant(10),
            scheduled_end: fixed_instant(11),
            max_participants: 25,
            chat_enabled: true,
            qa_enabled: true,
            polls_enabled: true,
            attendee_emails: vec![],
        }
    }

    /// Insert a session directly, bypassing the provider.
    pub async fn seed_session(&self, template: TestSession) -> Session {
        self.store
            .insert_session(&template.build(self.course_id, self.mentor.user_id))
            .await
            .unwrap()
    }
}

/// Builder for sessions seeded straight into the store.
#[derive(Debug, Clone)]
pub struct TestSession {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_participants: i32,
    chat_enabled: bool,
    qa_enabled: bool,
    polls_enabled: bool,
    meeting_link: String,
}

impl TestSession {
    /// A session whose start time has passed, so the first join makes it live.
    pub fn live_now() -> Self {
        let now = Utc::now();
        Self::between(now - Duration::minutes(5), now + Duration::hours(1))
    }

    /// A session that starts tomorrow.
    pub fn upcoming() -> Self {
        let start = Utc::now() + Duration::days(1);
        Self::between(start, start + Duration::hours(1))
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            max_participants: 25,
            chat_enabled: true,
            qa_enabled: true,
            polls_enabled: true,
            meeting_link: "https://meet.example.com/seeded".to_string(),
        }
    }

    pub fn capacity(mut self, max_participants: i32) -> Self {
        self.max_participants = max_participants;
        self
    }

    pub fn chat(mut self, enabled: bool) -> Self {
        self.chat_enabled = enabled;
        self
    }

    pub fn qa(mut self, enabled: bool) -> Self {
        self.qa_enabled = enabled;
        self
    }

    pub fn polls(mut self, enabled: bool) -> Self {
        self.polls_enabled = enabled;
        self
    }

    /// Seed with an empty stored link so joins resolve it from the provider.
    pub fn without_link(mut self) -> Self {
        self.meeting_link = String::new();
        self
    }

    pub fn build(self, course_id: CourseId, mentor_id: UserId) -> NewSession {
        let id = SessionId::new();
        NewSession {
            id,
            course_id,
            mentor_id,
            title: "Seeded session".to_string(),
            description: String::new(),
            scheduled_start: self.start,
            scheduled_end: self.end,
            meeting_link: self.meeting_link,
            external_meeting_id: format!("seeded-{id}"),
            max_participants: self.max_participants,
            chat_enabled: self.chat_enabled,
            qa_enabled: self.qa_enabled,
            polls_enabled: self.polls_enabled,
        }
    }
}
