//! Student follow controller.
//!
//! One instance per student connection. It consumes relay events, decides
//! which commands to send back, and reports follow-state transitions to the
//! lesson renderer:
//!
//! ```text
//! idle ──subscribe──▶ subscribed ──lesson:state──▶ following
//!   ▲                   ▲    │                         │
//!   └───unsubscribe─────┘    └◀── ended / end_confirmed / leave
//! ```
//!
//! A student is following exactly when it holds a snapshot received through
//! `lesson:state`. Step deltas are never trusted as a first piece of state.

use std::fmt;

use crate::events::{ClientEvent, ServerEvent};
use crate::session::{LessonId, LessonSession, RoomId, TeacherId};

/// Follow status of one student connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FollowState {
    /// Not listening for any teacher.
    #[default]
    Idle,
    /// Listening for a teacher, not mirroring a lesson.
    Subscribed,
    /// Mirroring a live lesson.
    Following,
}

impl fmt::Display for FollowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Following => write!(f, "following"),
        }
    }
}

/// Last snapshot of the followed lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownSession {
    /// Lesson being mirrored.
    pub lesson_id: LessonId,
    /// Display title.
    pub lesson_title: String,
    /// Step the renderer should show.
    pub current_step: u32,
    /// Number of steps.
    pub total_steps: u32,
    /// Room the student joined.
    pub room_id: RoomId,
}

impl From<&LessonSession> for KnownSession {
    fn from(session: &LessonSession) -> Self {
        Self {
            lesson_id: session.lesson_id.clone(),
            lesson_title: session.lesson_title.clone(),
            current_step: session.current_step,
            total_steps: session.total_steps,
            room_id: session.room_id.clone(),
        }
    }
}

/// A change of follow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowTransition {
    /// State before the event.
    pub from: FollowState,
    /// State after the event.
    pub to: FollowState,
}

/// What handling one relay event produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowReaction {
    /// Command to send to the relay, if any.
    pub command: Option<ClientEvent>,
    /// State change, if any.
    pub transition: Option<FollowTransition>,
}

/// Mirrors a teacher's live lesson for one student.
#[derive(Debug, Clone, Default)]
pub struct StudentFollowController {
    teacher_id: Option<TeacherId>,
    known: Option<KnownSession>,
    joining: Option<LessonId>,
}

impl StudentFollowController {
    /// Creates an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current follow state.
    #[must_use]
    pub const fn state(&self) -> FollowState {
        match (&self.teacher_id, &self.known) {
            (None, _) => FollowState::Idle,
            (Some(_), None) => FollowState::Subscribed,
            (Some(_), Some(_)) => FollowState::Following,
        }
    }

    /// Returns the teacher being followed, if any.
    #[must_use]
    pub const fn teacher_id(&self) -> Option<&TeacherId> {
        self.teacher_id.as_ref()
    }

    /// Returns the mirrored lesson, if following.
    #[must_use]
    pub const fn known_session(&self) -> Option<&KnownSession> {
        self.known.as_ref()
    }

    /// Returns the step the renderer should draw, if following.
    #[must_use]
    pub fn current_step(&self) -> Option<u32> {
        self.known.as_ref().map(|k| k.current_step)
    }

    /// Starts listening for `teacher_id`, dropping any previous follow.
    ///
    /// Returns the `student:subscribe` command to send.
    pub fn subscribe(&mut self, teacher_id: TeacherId) -> ClientEvent {
        self.known = None;
        self.joining = None;
        self.teacher_id = Some(teacher_id.clone());
        ClientEvent::subscribe(teacher_id)
    }

    /// Stops listening. Returns the command to send, if subscribed.
    pub fn unsubscribe(&mut self) -> Option<ClientEvent> {
        self.known = None;
        self.joining = None;
        self.teacher_id.take().map(|_| ClientEvent::Unsubscribe)
    }

    /// Leaves the followed lesson without waiting for the relay.
    ///
    /// Returns the `student:leave_lesson` command, if following.
    pub fn leave_lesson(&mut self) -> Option<ClientEvent> {
        self.joining = None;
        self.known.take().map(|_| ClientEvent::LeaveLesson)
    }

    /// Forgets all lesson state after a transport reconnect.
    ///
    /// Nothing carries over a reconnect; the returned command re-runs the
    /// subscription from scratch.
    pub fn reset_for_reconnect(&mut self) -> Option<ClientEvent> {
        self.known = None;
        self.joining = None;
        self.teacher_id.clone().map(ClientEvent::subscribe)
    }

    /// Applies one relay event.
    pub fn handle(&mut self, event: &ServerEvent) -> FollowReaction {
        let before = self.state();
        let command = match event {
            ServerEvent::SubscriptionConfirmed(p) => {
                if self.is_for_teacher(&p.teacher_id) && before == FollowState::Subscribed {
                    p.active_lesson
                        .as_ref()
                        .filter(|s| s.is_live())
                        .map(|s| self.begin_join(s.lesson_id.clone()))
                } else {
                    None
                }
            }
            ServerEvent::LessonStarted(p) => {
                if self.is_for_teacher(&p.teacher_id) && before == FollowState::Subscribed {
                    Some(self.begin_join(p.lesson_id.clone()))
                } else {
                    None
                }
            }
            ServerEvent::LessonState(session) => {
                self.accept_snapshot(session);
                None
            }
            ServerEvent::StepChanged(p) => {
                if let Some(known) = self.known.as_mut() {
                    if known.lesson_id == p.lesson_id && (1..=known.total_steps).contains(&p.step)
                    {
                        known.current_step = p.step;
                    }
                }
                None
            }
            ServerEvent::LessonEnded(_) | ServerEvent::EndConfirmed(_) => {
                if let Some(lesson_id) = event.lesson_id() {
                    self.finish(lesson_id);
                }
                None
            }
            ServerEvent::LessonLeft | ServerEvent::Error(_) => None,
        };

        let after = self.state();
        let transition = (before != after).then_some(FollowTransition {
            from: before,
            to: after,
        });
        FollowReaction {
            command,
            transition,
        }
    }

    fn is_for_teacher(&self, teacher_id: &TeacherId) -> bool {
        self.teacher_id.as_ref() == Some(teacher_id)
    }

    fn begin_join(&mut self, lesson_id: LessonId) -> ClientEvent {
        self.joining = Some(lesson_id.clone());
        ClientEvent::join_lesson(lesson_id)
    }

    fn accept_snapshot(&mut self, session: &LessonSession) {
        if !self.is_for_teacher(&session.teacher_id) || !session.is_live() {
            return;
        }
        let expected = self
            .joining
            .as_ref()
            .or_else(|| self.known.as_ref().map(|k| &k.lesson_id));
        if expected != Some(&session.lesson_id) {
            return;
        }
        self.joining = None;
        self.known = Some(KnownSession::from(session));
    }

    fn finish(&mut self, lesson_id: &LessonId) {
        if self.joining.as_ref() == Some(lesson_id) {
            self.joining = None;
        }
        if self.known.as_ref().is_some_and(|k| k.lesson_id == *lesson_id) {
            self.known = None;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
