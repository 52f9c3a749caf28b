//! Session registry: the single source of truth for which teachers are live.
//!
//! The relay never assumes process affinity for session state. Everything it
//! knows about a live lesson is read from and written to a [`SessionStore`],
//! which may be an in-process map or a shared external store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{RelayError, Result};
use crate::session::{LessonSession, TeacherId};

/// Storage for live lesson sessions, keyed by teacher.
///
/// Only the teacher session controller writes through this interface, and
/// only for the teacher it is acting for.
pub trait SessionStore: Send + Sync {
    /// Returns the session owned by `teacher_id`, if any.
    fn get(&self, teacher_id: &TeacherId) -> Result<Option<LessonSession>>;

    /// Installs or updates the session owned by `session.teacher_id`.
    fn put(&self, session: LessonSession) -> Result<()>;

    /// Removes and returns the session owned by `teacher_id`.
    fn remove(&self, teacher_id: &TeacherId) -> Result<Option<LessonSession>>;

    /// Returns how many sessions are currently stored.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if no sessions are stored.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Process-local [`SessionStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<TeacherId, LessonSession>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(_: impl std::fmt::Display) -> RelayError {
    RelayError::store_unavailable("session map lock poisoned")
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, teacher_id: &TeacherId) -> Result<Option<LessonSession>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(teacher_id).cloned())
    }

    fn put(&self, session: LessonSession) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.teacher_id.clone(), session);
        Ok(())
    }

    fn remove(&self, teacher_id: &TeacherId) -> Result<Option<LessonSession>> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(teacher_id))
    }

    fn len(&self) -> Result<usize> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.len())
    }
}
