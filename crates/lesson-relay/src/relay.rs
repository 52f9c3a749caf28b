//! Event relay: rooms, subscriptions, and ordered fan-out.
//!
//! Every connection owns a bounded outbound queue. The relay pushes events
//! onto those queues with `try_send` and never waits on the socket behind
//! them, so one slow or dead connection cannot hold up delivery to anyone
//! else. A connection whose queue is full loses the event; the failure is
//! reported in the delivery outcomes. Events pushed to a room are queued for
//! each member in the order they were issued.
//!
//! The relay keeps bidirectional indexes:
//! - `room → connections` for broadcast
//! - `connection → rooms` for cleanup on disconnect
//! - `teacher → connections` for students waiting on a teacher to go live

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::events::ServerEvent;
use crate::session::{RoomId, TeacherId};

/// Events a connection may have queued before further deliveries fail.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Outbound queue feeding one connection's socket writer.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Receiving end of a connection's outbound queue.
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// Creates an outbound queue with the default capacity.
#[must_use]
pub fn outbound_queue() -> (EventSender, EventReceiver) {
    mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a fresh connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Delivery Outcomes
// ============================================================================

/// Why an event could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The connection is not registered with the relay.
    UnknownConnection,
    /// The connection's socket task has gone away.
    ConnectionClosed,
    /// The connection is not draining its queue.
    QueueFull,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownConnection => write!(f, "unknown connection"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::QueueFull => write!(f, "outbound queue full"),
        }
    }
}

/// Result of queuing one event for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Target connection.
    pub connection: ConnectionId,
    /// `Ok` if the event was queued.
    pub outcome: std::result::Result<(), DeliveryFailure>,
}

impl Delivery {
    /// Returns `true` if the event was queued.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Logs failed deliveries. Outcomes never feed back into control flow.
pub fn log_deliveries(event: &ServerEvent, target: &str, deliveries: &[Delivery]) {
    let failed = deliveries.iter().filter(|d| !d.is_delivered()).count();
    debug!(
        event = event.event_name(),
        target,
        recipients = deliveries.len(),
        failed,
        "Relayed event"
    );
    for delivery in deliveries {
        if let Err(reason) = delivery.outcome {
            warn!(
                event = event.event_name(),
                target,
                connection_id = %delivery.connection,
                %reason,
                "Delivery failed"
            );
        }
    }
}

// ============================================================================
// EventRelay
// ============================================================================

/// Room membership and fan-out for every connection in the process.
#[derive(Debug, Default)]
pub struct EventRelay {
    /// Connection → outbound queue
    connections: HashMap<ConnectionId, EventSender>,
    /// Room → members in join order
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
    /// Connection → rooms it has joined
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
    /// Teacher → connections waiting for that teacher to go live
    watchers: HashMap<TeacherId, Vec<ConnectionId>>,
}

impl EventRelay {
    /// Creates an empty relay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound queue.
    pub fn register(&mut self, connection: ConnectionId, sender: EventSender) {
        self.connections.insert(connection, sender);
        self.memberships.entry(connection).or_default();
    }

    /// Forgets a connection and removes it from every room and watch list.
    ///
    /// Returns the rooms the connection was in.
    pub fn unregister(&mut self, connection: ConnectionId) -> HashSet<RoomId> {
        self.connections.remove(&connection);
        let rooms = self.memberships.remove(&connection).unwrap_or_default();
        for room in &rooms {
            self.remove_member(room, connection);
        }
        self.watchers.retain(|_, conns| {
            conns.retain(|c| *c != connection);
            !conns.is_empty()
        });
        rooms
    }

    /// Adds a connection to a room.
    ///
    /// Joining is idempotent: returns `false` if the connection was already a
    /// member or is not registered.
    pub fn join(&mut self, connection: ConnectionId, room: &RoomId) -> bool {
        let Some(rooms) = self.memberships.get_mut(&connection) else {
            return false;
        };
        if !rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room.clone()).or_default().push(connection);
        true
    }

    /// Removes a connection from a room. Returns `false` if it was not a member.
    pub fn leave(&mut self, connection: ConnectionId, room: &RoomId) -> bool {
        let removed = self
            .memberships
            .get_mut(&connection)
            .is_some_and(|rooms| rooms.remove(room));
        if removed {
            self.remove_member(room, connection);
        }
        removed
    }

    /// Drops a room and every membership in it. Returns the former members.
    pub fn release(&mut self, room: &RoomId) -> Vec<ConnectionId> {
        let members = self.rooms.remove(room).unwrap_or_default();
        for connection in &members {
            if let Some(rooms) = self.memberships.get_mut(connection) {
                rooms.remove(room);
            }
        }
        members
    }

    fn remove_member(&mut self, room: &RoomId, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.retain(|c| *c != connection);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Returns `true` if the connection is in the room.
    #[must_use]
    pub fn is_member(&self, connection: ConnectionId, room: &RoomId) -> bool {
        self.memberships
            .get(&connection)
            .is_some_and(|rooms| rooms.contains(room))
    }

    /// Returns the members of a room in join order.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> &[ConnectionId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registers interest in a teacher going live. Idempotent.
    pub fn watch(&mut self, connection: ConnectionId, teacher: &TeacherId) {
        let watchers = self.watchers.entry(teacher.clone()).or_default();
        if !watchers.contains(&connection) {
            watchers.push(connection);
        }
    }

    /// Withdraws interest in a teacher.
    pub fn unwatch(&mut self, connection: ConnectionId, teacher: &TeacherId) {
        if let Some(watchers) = self.watchers.get_mut(teacher) {
            watchers.retain(|c| *c != connection);
            if watchers.is_empty() {
                self.watchers.remove(teacher);
            }
        }
    }

    /// Queues an event for a single connection.
    pub fn send_to(&self, connection: ConnectionId, event: &ServerEvent) -> Delivery {
        let outcome = match self.connections.get(&connection) {
            None => Err(DeliveryFailure::UnknownConnection),
            Some(sender) => sender.try_send(event.clone()).map_err(|e| match e {
                TrySendError::Full(_) => DeliveryFailure::QueueFull,
                TrySendError::Closed(_) => DeliveryFailure::ConnectionClosed,
            }),
        };
        Delivery {
            connection,
            outcome,
        }
    }

    /// Queues an event for every current member of a room, in join order.
    pub fn broadcast(&self, room: &RoomId, event: &ServerEvent) -> Vec<Delivery> {
        let deliveries: Vec<Delivery> = self
            .members(room)
            .iter()
            .map(|connection| self.send_to(*connection, event))
            .collect();
        log_deliveries(event, room.as_str(), &deliveries);
        deliveries
    }

    /// Queues an event for every connection watching `teacher` that is not
    /// already a member of `skip_room`.
    pub fn notify_watchers(
        &self,
        teacher: &TeacherId,
        skip_room: &RoomId,
        event: &ServerEvent,
    ) -> Vec<Delivery> {
        let deliveries: Vec<Delivery> = self
            .watchers
            .get(teacher)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(|connection| !self.is_member(**connection, skip_room))
            .map(|connection| self.send_to(*connection, event))
            .collect();
        log_deliveries(event, teacher.as_str(), &deliveries);
        deliveries
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns the number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
