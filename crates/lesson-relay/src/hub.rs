//! Lesson hub: dispatches connection events to the controllers.
//!
//! All relay state sits behind one lock, so each inbound event is handled to
//! completion before the next one starts. Nothing inside the lock waits on a
//! socket: delivery is a push onto each connection's outbound queue.
//!
//! The hub also owns teacher disconnect handling. When the connection that
//! owns a live lesson goes away, teardown is scheduled after a grace period.
//! A reconnect from the same teacher before it fires takes the lesson over.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::events::{ClientEvent, EndReason, ServerEvent};
use crate::identity::{Identity, Role};
use crate::registry::{InMemorySessionStore, SessionStore};
use crate::relay::{log_deliveries, ConnectionId, EventRelay, EventSender};
use crate::session::{LessonId, LessonSession, RoomId, TeacherId};
use crate::teacher::TeacherSessionController;

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Open connections.
    pub connections: usize,
    /// Lessons currently live.
    pub live_sessions: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Shared entry point for every connection in the process.
#[derive(Clone)]
pub struct LessonHub {
    state: Arc<Mutex<HubState>>,
    grace_period: Duration,
}

impl fmt::Debug for LessonHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonHub")
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

struct ClientRecord {
    identity: Identity,
    subscribed_to: Option<TeacherId>,
    joined: Option<RoomId>,
}

struct PendingTeardown {
    id: u64,
    handle: AbortHandle,
}

struct HubState {
    store: Arc<dyn SessionStore>,
    relay: EventRelay,
    clients: HashMap<ConnectionId, ClientRecord>,
    /// Teacher → connection that started the live lesson
    owners: HashMap<TeacherId, ConnectionId>,
    teardowns: HashMap<TeacherId, PendingTeardown>,
    next_teardown_id: u64,
}

impl LessonHub {
    /// Creates a hub over a session store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, grace_period: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                store,
                relay: EventRelay::new(),
                clients: HashMap::new(),
                owners: HashMap::new(),
                teardowns: HashMap::new(),
                next_teardown_id: 0,
            })),
            grace_period,
        }
    }

    /// Creates a hub backed by a process-local store.
    #[must_use]
    pub fn in_memory(grace_period: Duration) -> Self {
        Self::new(Arc::new(InMemorySessionStore::new()), grace_period)
    }

    /// Registers a new connection and returns its id.
    ///
    /// A teacher connecting while one of their lessons waits out a disconnect
    /// grace period takes that lesson over and receives `lesson:state`.
    pub async fn connect(&self, identity: Identity, sender: EventSender) -> ConnectionId {
        let connection = ConnectionId::next();
        let mut state = self.state.lock().await;
        state.relay.register(connection, sender);

        info!(
            connection_id = %connection,
            user_id = %identity.user_id,
            role = %identity.role,
            "Connection registered"
        );

        if identity.role == Role::Teacher {
            let teacher = TeacherId::new(identity.user_id.clone());
            state.resume_teacher(connection, &teacher);
        }
        state.clients.insert(
            connection,
            ClientRecord {
                identity,
                subscribed_to: None,
                joined: None,
            },
        );
        connection
    }

    /// Handles one inbound event from a connection.
    ///
    /// Errors go back to the originating connection as an `error` event.
    /// Stale student references are dropped without a reply.
    pub async fn handle(&self, connection: ConnectionId, event: ClientEvent) {
        let name = event.event_name();
        let mut state = self.state.lock().await;
        if let Err(err) = state.dispatch(connection, event) {
            if err.is_reportable() {
                warn!(connection_id = %connection, event = name, error = %err, "Event rejected");
                state.reply(connection, &ServerEvent::error(&err));
            } else {
                debug!(connection_id = %connection, event = name, error = %err, "Event dropped");
            }
        }
    }

    /// Removes a connection.
    ///
    /// If it owned a live lesson, teardown is scheduled after the grace period.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.lock().await;
        state.relay.unregister(connection);
        let Some(client) = state.clients.remove(&connection) else {
            return;
        };
        info!(connection_id = %connection, user_id = %client.identity.user_id, "Connection closed");

        if client.identity.role != Role::Teacher {
            return;
        }
        let teacher = TeacherId::new(client.identity.user_id);
        if state.owners.get(&teacher) == Some(&connection) {
            state.owners.remove(&teacher);
            self.schedule_teardown(&mut state, teacher);
        }
    }

    fn schedule_teardown(&self, state: &mut HubState, teacher: TeacherId) {
        state.next_teardown_id += 1;
        let id = state.next_teardown_id;
        let shared = Arc::clone(&self.state);
        let grace = self.grace_period;
        let target = teacher.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            shared.lock().await.expire_teardown(&target, id);
        })
        .abort_handle();

        info!(
            teacher_id = %teacher,
            grace_secs = grace.as_secs_f32(),
            "Teacher disconnected, lesson teardown scheduled"
        );
        if let Some(previous) = state
            .teardowns
            .insert(teacher, PendingTeardown { id, handle })
        {
            previous.handle.abort();
        }
    }

    /// Returns the live lesson for a teacher, if any.
    pub async fn session(&self, teacher_id: &TeacherId) -> Result<Option<LessonSession>> {
        let state = self.state.lock().await;
        Ok(state.store.get(teacher_id)?.filter(LessonSession::is_live))
    }

    /// Returns connection and session counts.
    pub async fn stats(&self) -> Result<HubStats> {
        let state = self.state.lock().await;
        Ok(HubStats {
            connections: state.relay.connection_count(),
            live_sessions: state.store.len()?,
            rooms: state.relay.room_count(),
        })
    }
}

impl HubState {
    fn dispatch(&mut self, connection: ConnectionId, event: ClientEvent) -> Result<()> {
        let identity = self
            .clients
            .get(&connection)
            .map(|c| c.identity.clone())
            .ok_or_else(|| RelayError::unauthorized("connection is not registered"))?;

        match event {
            ClientEvent::StartLesson(p) => {
                let teacher = identity.as_teacher()?;
                TeacherSessionController::new(self.store.as_ref(), &mut self.relay).start_lesson(
                    connection,
                    &teacher,
                    p.lesson_id,
                    p.lesson_title,
                    p.total_steps,
                )?;
                // A rejected start leaves any pending teardown in place
                self.cancel_teardown(&teacher);
                self.owners.insert(teacher, connection);
                Ok(())
            }
            ClientEvent::SetStep(p) => {
                let teacher = identity.as_teacher()?;
                TeacherSessionController::new(self.store.as_ref(), &mut self.relay)
                    .set_step(&teacher, &p.lesson_id, p.step)?;
                Ok(())
            }
            ClientEvent::EndLesson => {
                let teacher = identity.as_teacher()?;
                self.cancel_teardown(&teacher);
                TeacherSessionController::new(self.store.as_ref(), &mut self.relay)
                    .end_lesson(&teacher)?;
                self.owners.remove(&teacher);
                Ok(())
            }
            ClientEvent::Subscribe(p) => self.subscribe(connection, p.teacher_id),
            ClientEvent::Unsubscribe => {
                self.detach_student(connection);
                Ok(())
            }
            ClientEvent::JoinLesson(p) => self.join_lesson(connection, &p.lesson_id),
            ClientEvent::LeaveLesson => {
                if let Some(room) = self
                    .clients
                    .get_mut(&connection)
                    .and_then(|c| c.joined.take())
                {
                    self.relay.leave(connection, &room);
                }
                self.reply(connection, &ServerEvent::LessonLeft);
                Ok(())
            }
        }
    }

    fn subscribe(&mut self, connection: ConnectionId, teacher_id: TeacherId) -> Result<()> {
        self.detach_student(connection);
        if let Some(client) = self.clients.get_mut(&connection) {
            client.subscribed_to = Some(teacher_id.clone());
        }
        self.relay.watch(connection, &teacher_id);

        let active = self.store.get(&teacher_id)?.filter(LessonSession::is_live);
        debug!(
            connection_id = %connection,
            teacher_id = %teacher_id,
            live = active.is_some(),
            "Student subscribed"
        );
        self.reply(
            connection,
            &ServerEvent::subscription_confirmed(teacher_id, active),
        );
        Ok(())
    }

    /// Joins the student to the live room and sends the full snapshot.
    ///
    /// Both happen under the hub lock, so no step change can slip between the
    /// snapshot and the first broadcast the student sees.
    fn join_lesson(&mut self, connection: ConnectionId, lesson_id: &LessonId) -> Result<()> {
        let teacher = self
            .clients
            .get(&connection)
            .and_then(|c| c.subscribed_to.clone())
            .ok_or_else(|| RelayError::stale_room(format!("?:{lesson_id}")))?;
        let session = self
            .store
            .get(&teacher)?
            .filter(|s| s.is_live() && s.lesson_id == *lesson_id)
            .ok_or_else(|| RelayError::stale_room(RoomId::derive(&teacher, lesson_id).as_str()))?;

        if let Some(client) = self.clients.get_mut(&connection) {
            if let Some(previous) = client.joined.replace(session.room_id.clone()) {
                if previous != session.room_id {
                    self.relay.leave(connection, &previous);
                }
            }
        }
        self.relay.join(connection, &session.room_id);
        debug!(
            connection_id = %connection,
            room_id = %session.room_id,
            step = session.current_step,
            "Student joined lesson"
        );
        self.reply(connection, &ServerEvent::LessonState(session));
        Ok(())
    }

    fn detach_student(&mut self, connection: ConnectionId) {
        let Some(client) = self.clients.get_mut(&connection) else {
            return;
        };
        if let Some(room) = client.joined.take() {
            self.relay.leave(connection, &room);
        }
        if let Some(teacher) = client.subscribed_to.take() {
            self.relay.unwatch(connection, &teacher);
        }
    }

    fn reply(&self, connection: ConnectionId, event: &ServerEvent) {
        let delivery = self.relay.send_to(connection, event);
        log_deliveries(event, "direct", &[delivery]);
    }

    fn resume_teacher(&mut self, connection: ConnectionId, teacher: &TeacherId) {
        let Some(pending) = self.teardowns.remove(teacher) else {
            return;
        };
        pending.handle.abort();

        match self.store.get(teacher) {
            Ok(Some(session)) if session.is_live() => {
                self.owners.insert(teacher.clone(), connection);
                self.relay.join(connection, &session.room_id);
                info!(
                    teacher_id = %teacher,
                    room_id = %session.room_id,
                    "Teacher reconnected within grace period"
                );
                self.reply(connection, &ServerEvent::LessonState(session));
            }
            Ok(_) => {}
            Err(err) => warn!(teacher_id = %teacher, error = %err, "Could not resume lesson"),
        }
    }

    fn cancel_teardown(&mut self, teacher: &TeacherId) {
        if let Some(pending) = self.teardowns.remove(teacher) {
            pending.handle.abort();
        }
    }

    fn expire_teardown(&mut self, teacher: &TeacherId, id: u64) {
        if !self.teardowns.get(teacher).is_some_and(|p| p.id == id) {
            return;
        }
        self.teardowns.remove(teacher);
        if self.owners.contains_key(teacher) {
            return;
        }
        if let Err(err) = TeacherSessionController::new(self.store.as_ref(), &mut self.relay)
            .teardown(teacher, EndReason::Disconnected)
        {
            warn!(teacher_id = %teacher, error = %err, "Lesson teardown failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
