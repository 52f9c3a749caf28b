//! Teacher session controller.
//!
//! Translates teacher intents into session store writes followed by room
//! broadcasts. Store writes always happen first, so a lesson is over as soon
//! as it leaves the store even if some broadcasts are still queued.

use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::events::{EndReason, ServerEvent};
use crate::registry::SessionStore;
use crate::relay::{ConnectionId, EventRelay};
use crate::session::{LessonId, LessonSession, TeacherId};

/// The only writer of lesson session state.
///
/// Callers must have checked that the acting connection belongs to the
/// teacher named in each call; the controller trusts the identity it is given.
pub struct TeacherSessionController<'a> {
    store: &'a dyn SessionStore,
    relay: &'a mut EventRelay,
}

impl<'a> TeacherSessionController<'a> {
    /// Creates a controller over a store and a relay.
    pub fn new(store: &'a dyn SessionStore, relay: &'a mut EventRelay) -> Self {
        Self { store, relay }
    }

    /// Starts a lesson for `teacher_id`, owned by connection `owner`.
    ///
    /// A lesson that is already live for this teacher is ended first: its room
    /// receives `lesson:ended` with reason `superseded` before the new session
    /// is installed. The owner joins the new room, which then receives
    /// `lesson:started`; students subscribed to the teacher receive it too.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidLesson` if the lesson metadata is unusable
    /// (the live lesson, if any, is left untouched), or a store error.
    pub fn start_lesson(
        &mut self,
        owner: ConnectionId,
        teacher_id: &TeacherId,
        lesson_id: LessonId,
        lesson_title: String,
        total_steps: u32,
    ) -> Result<LessonSession> {
        let session =
            LessonSession::start(teacher_id.clone(), lesson_id, lesson_title, total_steps)?;

        if let Some(previous) = self.store.remove(teacher_id)? {
            if previous.is_live() {
                info!(
                    teacher_id = %teacher_id,
                    room_id = %previous.room_id,
                    "Superseding live lesson"
                );
                self.close_room(
                    &previous,
                    &ServerEvent::lesson_ended(previous.lesson_id.clone(), EndReason::Superseded),
                );
            }
        }

        self.store.put(session.clone())?;
        self.relay.join(owner, &session.room_id);

        let started = ServerEvent::lesson_started(&session);
        self.relay.broadcast(&session.room_id, &started);
        self.relay
            .notify_watchers(teacher_id, &session.room_id, &started);

        info!(
            teacher_id = %teacher_id,
            room_id = %session.room_id,
            total_steps = session.total_steps,
            "Lesson started"
        );
        Ok(session)
    }

    /// Moves the live lesson to `step` and tells the room.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::NoActiveSession` if the teacher has no live lesson
    /// or the live lesson is not `lesson_id`, and `RelayError::StepOutOfRange`
    /// if `step` is outside `1..=total_steps`. Nothing is broadcast on error.
    pub fn set_step(
        &mut self,
        teacher_id: &TeacherId,
        lesson_id: &LessonId,
        step: u32,
    ) -> Result<LessonSession> {
        let mut session = self
            .store
            .get(teacher_id)?
            .filter(|s| s.is_live() && s.lesson_id == *lesson_id)
            .ok_or_else(|| RelayError::no_active_session(teacher_id.as_str()))?;

        session.set_step(step)?;
        self.store.put(session.clone())?;

        self.relay.broadcast(
            &session.room_id,
            &ServerEvent::step_changed(session.lesson_id.clone(), step),
        );

        debug!(teacher_id = %teacher_id, step, "Step changed");
        Ok(session)
    }

    /// Ends the teacher's lesson.
    ///
    /// The room receives `lesson:end_confirmed` and is released. Ending when
    /// nothing is live is a no-op that returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the session store is unavailable.
    pub fn end_lesson(&mut self, teacher_id: &TeacherId) -> Result<Option<LessonSession>> {
        let Some(mut session) = self.store.remove(teacher_id)? else {
            debug!(teacher_id = %teacher_id, "End requested with no live lesson");
            return Ok(None);
        };
        session.end();
        self.close_room(
            &session,
            &ServerEvent::end_confirmed(session.lesson_id.clone()),
        );

        info!(teacher_id = %teacher_id, room_id = %session.room_id, "Lesson ended");
        Ok(Some(session))
    }

    /// Ends the teacher's lesson without an explicit request.
    ///
    /// The room receives `lesson:ended` carrying `reason` and is released.
    ///
    /// # Errors
    ///
    /// Returns a store error if the session store is unavailable.
    pub fn teardown(
        &mut self,
        teacher_id: &TeacherId,
        reason: EndReason,
    ) -> Result<Option<LessonSession>> {
        let Some(mut session) = self.store.remove(teacher_id)? else {
            return Ok(None);
        };
        session.end();
        self.close_room(
            &session,
            &ServerEvent::lesson_ended(session.lesson_id.clone(), reason),
        );

        info!(
            teacher_id = %teacher_id,
            room_id = %session.room_id,
            ?reason,
            "Lesson torn down"
        );
        Ok(Some(session))
    }

    fn close_room(&mut self, session: &LessonSession, event: &ServerEvent) {
        self.relay.broadcast(&session.room_id, event);
        self.relay.release(&session.room_id);
    }
}

// ============================================================================
// Tests
// ============================================================================
