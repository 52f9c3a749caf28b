//! Event vocabulary exchanged between clients and the relay.
//!
//! Every frame is a JSON object with an `event` name and, for events that
//! carry data, a `payload` object:
//!
//! ```json
//! {"event": "lesson:step_changed", "payload": {"lessonId": "algebra-1", "step": 2, "changedAt": "..."}}
//! ```
//!
//! # Inbound (`ClientEvent`)
//!
//! - `teacher:start_lesson`, `teacher:set_step`, `teacher:end_lesson`
//! - `student:subscribe`, `student:unsubscribe`, `student:join_lesson`,
//!   `student:leave_lesson`
//!
//! # Outbound (`ServerEvent`)
//!
//! - `lesson:started`, `lesson:step_changed`, `lesson:ended`,
//!   `lesson:end_confirmed` (room broadcasts)
//! - `subscription:confirmed`, `lesson:state`, `lesson:left`, `error`
//!   (sent to one connection)
//!
//! `lesson:started` doubles as the availability notice for students that are
//! subscribed to a teacher but not yet in the room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::session::{LessonId, LessonSession, RoomId, TeacherId};

// ============================================================================
// Inbound Payloads
// ============================================================================

/// Payload for `teacher:start_lesson`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartLessonPayload {
    /// Lesson to teach.
    pub lesson_id: LessonId,
    /// Display title.
    pub lesson_title: String,
    /// Number of steps, taken from the lesson content metadata.
    pub total_steps: u32,
}

/// Payload for `teacher:set_step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStepPayload {
    /// Lesson the teacher believes is live.
    pub lesson_id: LessonId,
    /// Requested step, 1-indexed.
    pub step: u32,
}

/// Payload for `student:subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Teacher to follow.
    pub teacher_id: TeacherId,
}

/// Payload for `student:join_lesson`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLessonPayload {
    /// Lesson the student wants to mirror.
    pub lesson_id: LessonId,
}

// ============================================================================
// Inbound Event Enum
// ============================================================================

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    /// Teacher starts (or restarts) a lesson.
    #[serde(rename = "teacher:start_lesson")]
    StartLesson(StartLessonPayload),
    /// Teacher moves the lesson to a step.
    #[serde(rename = "teacher:set_step")]
    SetStep(SetStepPayload),
    /// Teacher ends the lesson.
    #[serde(rename = "teacher:end_lesson")]
    EndLesson,
    /// Student starts listening for a teacher.
    #[serde(rename = "student:subscribe")]
    Subscribe(SubscribePayload),
    /// Student stops listening for a teacher.
    #[serde(rename = "student:unsubscribe")]
    Unsubscribe,
    /// Student joins the room of the subscribed teacher's live lesson.
    #[serde(rename = "student:join_lesson")]
    JoinLesson(JoinLessonPayload),
    /// Student leaves the room it joined.
    #[serde(rename = "student:leave_lesson")]
    LeaveLesson,
}

impl ClientEvent {
    /// Creates a `teacher:start_lesson` event.
    #[must_use]
    pub fn start_lesson(
        lesson_id: impl Into<LessonId>,
        lesson_title: impl Into<String>,
        total_steps: u32,
    ) -> Self {
        Self::StartLesson(StartLessonPayload {
            lesson_id: lesson_id.into(),
            lesson_title: lesson_title.into(),
            total_steps,
        })
    }

    /// Creates a `teacher:set_step` event.
    #[must_use]
    pub fn set_step(lesson_id: impl Into<LessonId>, step: u32) -> Self {
        Self::SetStep(SetStepPayload {
            lesson_id: lesson_id.into(),
            step,
        })
    }

    /// Creates a `student:subscribe` event.
    #[must_use]
    pub fn subscribe(teacher_id: impl Into<TeacherId>) -> Self {
        Self::Subscribe(SubscribePayload {
            teacher_id: teacher_id.into(),
        })
    }

    /// Creates a `student:join_lesson` event.
    #[must_use]
    pub fn join_lesson(lesson_id: impl Into<LessonId>) -> Self {
        Self::JoinLesson(JoinLessonPayload {
            lesson_id: lesson_id.into(),
        })
    }

    /// Returns the event name as it appears on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::StartLesson(_) => "teacher:start_lesson",
            Self::SetStep(_) => "teacher:set_step",
            Self::EndLesson => "teacher:end_lesson",
            Self::Subscribe(_) => "student:subscribe",
            Self::Unsubscribe => "student:unsubscribe",
            Self::JoinLesson(_) => "student:join_lesson",
            Self::LeaveLesson => "student:leave_lesson",
        }
    }
}

// ============================================================================
// Outbound Payloads
// ============================================================================

/// Payload for `lesson:started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStartedPayload {
    /// Teacher who went live.
    pub teacher_id: TeacherId,
    /// Room to join for this lesson.
    pub room_id: RoomId,
    /// Lesson being taught.
    pub lesson_id: LessonId,
    /// Display title.
    pub lesson_title: String,
    /// Always 1 at start.
    pub current_step: u32,
    /// Number of steps.
    pub total_steps: u32,
}

/// Payload for `lesson:step_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChangedPayload {
    /// Lesson whose step moved.
    pub lesson_id: LessonId,
    /// New current step.
    pub step: u32,
    /// When the teacher moved the step.
    pub changed_at: DateTime<Utc>,
}

/// Why a lesson stopped from the students' point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The teacher started another lesson while this one was live.
    Superseded,
    /// The teacher's connection dropped and did not come back in time.
    Disconnected,
}

/// Payload for `lesson:ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonEndedPayload {
    /// Lesson that stopped.
    pub lesson_id: LessonId,
    /// Why it stopped.
    pub reason: EndReason,
    /// When it stopped.
    pub ended_at: DateTime<Utc>,
}

/// Payload for `lesson:end_confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConfirmedPayload {
    /// Lesson the teacher ended.
    pub lesson_id: LessonId,
    /// When it ended.
    pub ended_at: DateTime<Utc>,
}

/// Payload for `subscription:confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfirmedPayload {
    /// Teacher now being followed.
    pub teacher_id: TeacherId,
    /// Live session at subscribe time, for late joiners.
    pub active_lesson: Option<LessonSession>,
}

/// Payload for `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// Outbound Event Enum
// ============================================================================

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    /// A teacher went live. Sent to the room and to subscribed students.
    #[serde(rename = "lesson:started")]
    LessonStarted(LessonStartedPayload),
    /// The teacher moved to another step.
    #[serde(rename = "lesson:step_changed")]
    StepChanged(StepChangedPayload),
    /// The lesson stopped without an explicit end.
    #[serde(rename = "lesson:ended")]
    LessonEnded(LessonEndedPayload),
    /// The teacher explicitly ended the lesson.
    #[serde(rename = "lesson:end_confirmed")]
    EndConfirmed(EndConfirmedPayload),
    /// A subscription was accepted.
    #[serde(rename = "subscription:confirmed")]
    SubscriptionConfirmed(SubscriptionConfirmedPayload),
    /// Full authoritative snapshot sent on join.
    #[serde(rename = "lesson:state")]
    LessonState(LessonSession),
    /// The student left the room.
    #[serde(rename = "lesson:left")]
    LessonLeft,
    /// An intent from this connection was refused.
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Creates a `lesson:started` event describing a fresh session.
    #[must_use]
    pub fn lesson_started(session: &LessonSession) -> Self {
        Self::LessonStarted(LessonStartedPayload {
            teacher_id: session.teacher_id.clone(),
            room_id: session.room_id.clone(),
            lesson_id: session.lesson_id.clone(),
            lesson_title: session.lesson_title.clone(),
            current_step: session.current_step,
            total_steps: session.total_steps,
        })
    }

    /// Creates a `lesson:step_changed` event stamped with the current time.
    #[must_use]
    pub fn step_changed(lesson_id: LessonId, step: u32) -> Self {
        Self::StepChanged(StepChangedPayload {
            lesson_id,
            step,
            changed_at: Utc::now(),
        })
    }

    /// Creates a `lesson:ended` event stamped with the current time.
    #[must_use]
    pub fn lesson_ended(lesson_id: LessonId, reason: EndReason) -> Self {
        Self::LessonEnded(LessonEndedPayload {
            lesson_id,
            reason,
            ended_at: Utc::now(),
        })
    }

    /// Creates a `lesson:end_confirmed` event stamped with the current time.
    #[must_use]
    pub fn end_confirmed(lesson_id: LessonId) -> Self {
        Self::EndConfirmed(EndConfirmedPayload {
            lesson_id,
            ended_at: Utc::now(),
        })
    }

    /// Creates a `subscription:confirmed` event.
    #[must_use]
    pub const fn subscription_confirmed(
        teacher_id: TeacherId,
        active_lesson: Option<LessonSession>,
    ) -> Self {
        Self::SubscriptionConfirmed(SubscriptionConfirmedPayload {
            teacher_id,
            active_lesson,
        })
    }

    /// Creates an `error` event from a relay error.
    #[must_use]
    pub fn error(err: &RelayError) -> Self {
        Self::Error(ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        })
    }

    /// Returns the lesson this event refers to, if it refers to one.
    #[must_use]
    pub const fn lesson_id(&self) -> Option<&LessonId> {
        match self {
            Self::LessonStarted(p) => Some(&p.lesson_id),
            Self::StepChanged(p) => Some(&p.lesson_id),
            Self::LessonEnded(p) => Some(&p.lesson_id),
            Self::EndConfirmed(p) => Some(&p.lesson_id),
            Self::LessonState(session) => Some(&session.lesson_id),
            Self::SubscriptionConfirmed(_) | Self::LessonLeft | Self::Error(_) => None,
        }
    }

    /// Returns the event name as it appears on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::LessonStarted(_) => "lesson:started",
            Self::StepChanged(_) => "lesson:step_changed",
            Self::LessonEnded(_) => "lesson:ended",
            Self::EndConfirmed(_) => "lesson:end_confirmed",
            Self::SubscriptionConfirmed(_) => "subscription:confirmed",
            Self::LessonState(_) => "lesson:state",
            Self::LessonLeft => "lesson:left",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
