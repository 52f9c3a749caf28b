//! Lesson Relay
//!
//! Keeps every student following a live lesson on the exact step the teacher
//! is presenting. Teachers drive a session through step intents; the relay
//! holds the authoritative state and fans changes out to the lesson's room
//! over WebSocket.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod follow;
pub mod hub;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod session;
pub mod teacher;
pub mod websocket;

pub use api::{create_router, AppState, ErrorResponse, HealthResponse};
pub use config::{Config, CONFIG_FILE_NAME};
pub use error::{RelayError, Result};
pub use events::{ClientEvent, EndReason, ServerEvent};
pub use follow::{
    FollowReaction, FollowState, FollowTransition, KnownSession, StudentFollowController,
};
pub use hub::{HubStats, LessonHub};
pub use identity::{ConnectParams, GatewayParamsProvider, Identity, IdentityProvider, Role};
pub use registry::{InMemorySessionStore, SessionStore};
pub use relay::{
    outbound_queue, ConnectionId, Delivery, DeliveryFailure, EventReceiver, EventRelay,
    EventSender, OUTBOUND_QUEUE_CAPACITY,
};
pub use session::{LessonId, LessonSession, RoomId, SessionStatus, TeacherId};
pub use teacher::TeacherSessionController;
