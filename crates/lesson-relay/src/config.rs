//! Configuration for the lesson relay server.
//!
//! Settings come from an optional `lesson-relay.json` file. Every field has a
//! default, so a missing file yields a working local configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "lesson-relay.json";

/// Longest teacher disconnect grace period accepted.
const MAX_GRACE_PERIOD_SECS: u64 = 300;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    4000
}

const fn default_grace_period_secs() -> u64 {
    10
}

const fn default_heartbeat_interval_secs() -> u64 {
    30
}

const fn default_max_missed_pongs() -> u32 {
    3
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the HTTP listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds a live lesson survives its teacher's disconnect.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Seconds between WebSocket pings.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Unanswered pings before a connection is dropped.
    #[serde(default = "default_max_missed_pongs")]
    pub max_missed_pongs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            grace_period_secs: default_grace_period_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_missed_pongs: default_max_missed_pongs(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            RelayError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `lesson-relay.json` from a directory, or defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a file path, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ConfigParseError` if the file cannot be read or is
    /// not valid JSON, and `RelayError::ConfigValidationError` if a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(RelayError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| RelayError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ConfigValidationError` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.trim().is_empty() {
            return Err(RelayError::config_validation(
                "bindAddress must not be empty",
                "Set bindAddress to an interface address such as 127.0.0.1 or 0.0.0.0",
            ));
        }

        if !(1..=MAX_GRACE_PERIOD_SECS).contains(&self.grace_period_secs) {
            return Err(RelayError::config_validation(
                format!(
                    "gracePeriodSecs must be between 1 and {MAX_GRACE_PERIOD_SECS}, got {}",
                    self.grace_period_secs
                ),
                "Set gracePeriodSecs to a few seconds, e.g. 10",
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(RelayError::config_validation(
                "heartbeatIntervalSecs must be greater than 0",
                "Set heartbeatIntervalSecs to at least 1 second in your lesson-relay.json",
            ));
        }

        if self.max_missed_pongs == 0 {
            return Err(RelayError::config_validation(
                "maxMissedPongs must be greater than 0",
                "Set maxMissedPongs to at least 1 in your lesson-relay.json",
            ));
        }

        Ok(())
    }

    /// Returns the teacher disconnect grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Returns the WebSocket ping interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the `host:port` pair to bind.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

// ============================================================================
// Tests
// ============================================================================
