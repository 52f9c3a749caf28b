//! Error types for the live lesson relay.
//!
//! This module defines the error hierarchy for every relay operation:
//! teacher intents rejected by the session controller, connections rejected
//! at the auth boundary, session store failures, and configuration loading.

use std::path::PathBuf;

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying a live lesson.
///
/// Controller errors (`NoActiveSession`, `StepOutOfRange`, `InvalidLesson`)
/// are returned to the originating teacher connection only and are never
/// broadcast to a room.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // ========================================================================
    // Session Controller Errors
    // ========================================================================
    /// The teacher has no live session to act on.
    #[error("No active lesson for teacher '{teacher_id}'")]
    NoActiveSession {
        /// The teacher who issued the intent.
        teacher_id: String,
    },

    /// A step change named a step outside `1..=total_steps`.
    #[error("Step {step} is out of range (lesson has {total_steps} steps)")]
    StepOutOfRange {
        /// The requested step.
        step: u32,
        /// Number of steps in the live lesson.
        total_steps: u32,
    },

    /// A start request carried lesson metadata that cannot back a session.
    #[error("Invalid lesson: {message}")]
    InvalidLesson {
        /// Description of what was wrong with the lesson.
        message: String,
    },

    // ========================================================================
    // Boundary Errors
    // ========================================================================
    /// The connection is not allowed to issue this event.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Why the event was refused.
        reason: String,
    },

    /// The connection handshake did not carry a usable identity.
    #[error("Invalid identity: {message}")]
    InvalidIdentity {
        /// Description of the identity problem.
        message: String,
    },

    /// A student event referenced a room the relay no longer tracks.
    ///
    /// Dropped silently at the relay; never surfaced to the student.
    #[error("Stale room reference: '{room_id}'")]
    StaleRoom {
        /// The room the event referenced.
        room_id: String,
    },

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// The session store could not be read or written.
    #[error("Session store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the store failure.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lesson-relay.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Creates a new `NoActiveSession` error.
    #[must_use]
    pub fn no_active_session(teacher_id: impl Into<String>) -> Self {
        Self::NoActiveSession {
            teacher_id: teacher_id.into(),
        }
    }

    /// Creates a new `StepOutOfRange` error.
    #[must_use]
    pub const fn step_out_of_range(step: u32, total_steps: u32) -> Self {
        Self::StepOutOfRange { step, total_steps }
    }

    /// Creates a new `InvalidLesson` error.
    #[must_use]
    pub fn invalid_lesson(message: impl Into<String>) -> Self {
        Self::InvalidLesson {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidIdentity` error.
    #[must_use]
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    /// Creates a new `StaleRoom` error.
    #[must_use]
    pub fn stale_room(room_id: impl Into<String>) -> Self {
        Self::StaleRoom {
            room_id: room_id.into(),
        }
    }

    /// Creates a new `StoreUnavailable` error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Returns the stable wire code used in `error` events.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoActiveSession { .. } => "no_active_session",
            Self::StepOutOfRange { .. } => "step_out_of_range",
            Self::InvalidLesson { .. } => "invalid_lesson",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidIdentity { .. } => "invalid_identity",
            Self::StaleRoom { .. } => "stale_room",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. } => "config",
            Self::Json(_) => "invalid_event",
            Self::Io(_) => "internal",
        }
    }

    /// Returns `true` if this error must be reported back to the connection
    /// that caused it.
    ///
    /// `StaleRoom` is the only error dropped without a reply.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        !matches!(self, Self::StaleRoom { .. })
    }
}
