//! Connection identity supplied by the authentication collaborator.
//!
//! The relay does not authenticate anyone. An upstream gateway resolves who is
//! connecting and in which role; the relay only reads that result through an
//! [`IdentityProvider`] and refuses sockets that arrive without one.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::session::TeacherId;

/// Accepted shape for user identifiers.
static USER_ID_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").ok());

/// Role of a connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May drive lessons.
    Teacher,
    /// May follow lessons.
    Student,
}

impl Role {
    /// Parses a role name, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Role granted by the auth collaborator.
    pub role: Role,
}

impl Identity {
    /// Creates a teacher identity.
    #[must_use]
    pub fn teacher(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Teacher,
        }
    }

    /// Creates a student identity.
    #[must_use]
    pub fn student(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Student,
        }
    }

    /// Returns the teacher id this identity may act as.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Unauthorized` for non-teacher identities.
    pub fn as_teacher(&self) -> Result<TeacherId> {
        match self.role {
            Role::Teacher => Ok(TeacherId::new(self.user_id.clone())),
            Role::Student => Err(RelayError::unauthorized(format!(
                "'{}' is not a teacher",
                self.user_id
            ))),
        }
    }
}

/// Query parameters set on the WebSocket upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// User identifier.
    pub user_id: Option<String>,
    /// Role name (`teacher` or `student`).
    pub role: Option<String>,
}

/// Resolves the identity behind a connection attempt.
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Returns the identity for an upgrade request.
    fn identify(&self, params: &ConnectParams) -> Result<Identity>;
}

/// Trusts the `userId` and `role` query parameters written by the gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayParamsProvider;

impl IdentityProvider for GatewayParamsProvider {
    fn identify(&self, params: &ConnectParams) -> Result<Identity> {
        let user_id = params
            .user_id
            .as_deref()
            .ok_or_else(|| RelayError::invalid_identity("missing userId"))?;
        let role = params
            .role
            .as_deref()
            .ok_or_else(|| RelayError::invalid_identity("missing role"))?;

        if !is_valid_user_id(user_id) {
            return Err(RelayError::invalid_identity(format!(
                "malformed userId '{user_id}'"
            )));
        }
        let role = Role::from_str_case_insensitive(role).ok_or_else(|| {
            RelayError::invalid_identity(format!(
                "invalid role '{role}': expected one of 'teacher', 'student'"
            ))
        })?;

        Ok(Identity {
            user_id: user_id.to_string(),
            role,
        })
    }
}

fn is_valid_user_id(user_id: &str) -> bool {
    USER_ID_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(user_id))
}
