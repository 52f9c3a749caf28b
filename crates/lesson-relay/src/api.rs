//! HTTP surface of the lesson relay.
//!
//! # Endpoints
//!
//! - `GET /ws` - WebSocket upgrade (identity in `userId` and `role` query params)
//! - `GET /api/health` - Liveness and connection counts
//! - `GET /api/sessions/:teacher_id` - Live lesson snapshot for a teacher
//!
//! # Example
//!
//! ```no_run
//! use lesson_relay::{create_router, AppState, Config};
//!
//! # async fn example() {
//! let config = Config::default();
//! let addr = config.listen_addr();
//! let router = create_router(AppState::new(config));
//! let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::error::RelayError;
use crate::hub::LessonHub;
use crate::identity::{GatewayParamsProvider, IdentityProvider};
use crate::session::{LessonSession, TeacherId};
use crate::websocket::ws_handler;
use crate::Config;

// ============================================================================
// Response Types
// ============================================================================

/// Response body for `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Lessons currently live.
    pub live_sessions: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared state behind every route.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Lesson hub shared by all connections.
    pub hub: LessonHub,
    /// Resolves socket identities.
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Creates state with an in-memory session store and gateway identities.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub = LessonHub::in_memory(config.grace_period());
        Self::with_hub(config, hub, Arc::new(GatewayParamsProvider))
    }

    /// Creates state from explicit collaborators.
    #[must_use]
    pub fn with_hub(config: Config, hub: LessonHub, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            config,
            hub,
            identity,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for HTTP handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// Handshake carried no usable identity.
    Unauthorized(String),
    /// The requested resource does not exist.
    NotFound(String),
    /// The session store failed.
    Unavailable(String),
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidIdentity { .. } | RelayError::Unauthorized { .. } => {
                Self::Unauthorized(err.to_string())
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unavailable(msg) => {
                warn!(error = %msg, "Request failed");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with the WebSocket and API routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/sessions/:teacher_id", get(handle_session));

    Router::new()
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/health`.
async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.hub.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        connections: stats.connections,
        live_sessions: stats.live_sessions,
        rooms: stats.rooms,
    }))
}

/// Handler for `GET /api/sessions/:teacher_id`.
async fn handle_session(
    State(state): State<Arc<AppState>>,
    Path(teacher_id): Path<String>,
) -> Result<Json<LessonSession>, ApiError> {
    let teacher_id = TeacherId::new(teacher_id);
    state
        .hub
        .session(&teacher_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No live lesson for teacher '{teacher_id}'")))
}

// ============================================================================
// Tests
// ============================================================================
