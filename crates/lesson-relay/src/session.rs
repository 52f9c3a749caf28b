//! Live lesson session types.
//!
//! This module defines the authoritative state of one teacher's live lesson
//! and the identifiers used to address it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identity of a teacher. Unique key in the session store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherId(String);

/// Identity of a lesson whose content lives outside the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(String);

/// Relay address of a live session.
///
/// Always derived from the owning teacher and the lesson; never assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Creates an identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(TeacherId);
string_id!(LessonId);

impl RoomId {
    /// Derives the room address for a teacher teaching a lesson.
    ///
    /// # Examples
    ///
    /// ```
    /// use lesson_relay::{LessonId, RoomId, TeacherId};
    ///
    /// let room = RoomId::derive(&TeacherId::new("frizzle"), &LessonId::new("algebra-1"));
    /// assert_eq!(room.as_str(), "frizzle:algebra-1");
    /// ```
    #[must_use]
    pub fn derive(teacher_id: &TeacherId, lesson_id: &LessonId) -> Self {
        Self(format!("{teacher_id}:{lesson_id}"))
    }

    /// Returns the room address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle status of a lesson session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The teacher is driving the lesson.
    #[default]
    Live,
    /// The lesson has finished and is about to leave the store.
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

// ============================================================================
// LessonSession
// ============================================================================

/// One teacher's live lesson.
///
/// Invariant: `1 <= current_step <= total_steps`. The step only moves through
/// [`LessonSession::set_step`], which the teacher controller calls on behalf
/// of the owning teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSession {
    /// The owning teacher.
    pub teacher_id: TeacherId,

    /// The lesson being taught.
    pub lesson_id: LessonId,

    /// Display title of the lesson.
    pub lesson_title: String,

    /// Current step, 1-indexed.
    pub current_step: u32,

    /// Number of steps, fixed when the session starts.
    pub total_steps: u32,

    /// Relay address derived from teacher and lesson.
    pub room_id: RoomId,

    /// When the session was created.
    pub started_at: DateTime<Utc>,

    /// Lifecycle status.
    pub status: SessionStatus,
}

impl LessonSession {
    /// Creates a live session positioned on step 1.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidLesson` if `total_steps` is zero or the
    /// lesson id is blank.
    ///
    /// # Examples
    ///
    /// ```
    /// use lesson_relay::{LessonSession, SessionStatus};
    ///
    /// let session = LessonSession::start("frizzle", "algebra-1", "Linear equations", 6).unwrap();
    /// assert_eq!(session.current_step, 1);
    /// assert_eq!(session.status, SessionStatus::Live);
    /// assert_eq!(session.room_id.as_str(), "frizzle:algebra-1");
    /// ```
    pub fn start(
        teacher_id: impl Into<TeacherId>,
        lesson_id: impl Into<LessonId>,
        lesson_title: impl Into<String>,
        total_steps: u32,
    ) -> Result<Self> {
        let teacher_id = teacher_id.into();
        let lesson_id = lesson_id.into();

        if total_steps == 0 {
            return Err(RelayError::invalid_lesson(
                "totalSteps must be at least 1",
            ));
        }
        if lesson_id.as_str().trim().is_empty() {
            return Err(RelayError::invalid_lesson("lessonId must not be empty"));
        }

        let room_id = RoomId::derive(&teacher_id, &lesson_id);
        Ok(Self {
            teacher_id,
            lesson_id,
            lesson_title: lesson_title.into(),
            current_step: 1,
            total_steps,
            room_id,
            started_at: Utc::now(),
            status: SessionStatus::Live,
        })
    }

    /// Returns `true` while the teacher is driving the lesson.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Live
    }

    /// Moves the lesson to `step`.
    ///
    /// Steps may go backwards. Out-of-range steps are rejected, never clamped,
    /// and leave the session untouched.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::StepOutOfRange` if `step` is not in
    /// `1..=total_steps`.
    pub fn set_step(&mut self, step: u32) -> Result<()> {
        if step == 0 || step > self.total_steps {
            return Err(RelayError::step_out_of_range(step, self.total_steps));
        }
        self.current_step = step;
        Ok(())
    }

    /// Marks the session as ended.
    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
    }
}

// ============================================================================
// Tests
// ============================================================================
