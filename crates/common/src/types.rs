//! Common data types for live-session components.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Borrow the underlying UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| ParseError::InvalidId {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Unique identifier for a live session
    SessionId,
    "session"
);

define_id!(
    /// Unique identifier for a user (mentor or student)
    UserId,
    "user"
);

define_id!(
    /// Unique identifier for a course
    CourseId,
    "course"
);

define_id!(
    /// Unique identifier for one real-time socket connection
    ConnectionId,
    "connection"
);

/// Role of a verified caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Enrolled learner.
    Student,
    /// Course owner who runs sessions.
    Mentor,
}

impl Role {
    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "mentor" => Ok(Role::Mentor),
            other => Err(ParseError::UnknownRole(other.to_string())),
        }
    }
}

/// An already-verified caller.
///
/// Produced by the authentication boundary; the core performs only
/// role and ownership checks against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Verified user identifier.
    pub user_id: UserId,
    /// Verified role.
    pub role: Role,
}

impl Identity {
    /// Identity for a student.
    #[must_use]
    pub fn student(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Student,
        }
    }

    /// Identity for a mentor.
    #[must_use]
    pub fn mentor(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Mentor,
        }
    }

    /// Whether this caller is a mentor.
    #[must_use]
    pub fn is_mentor(&self) -> bool {
        self.role == Role::Mentor
    }
}
