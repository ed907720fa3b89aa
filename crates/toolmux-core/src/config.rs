//! Pool settings and the on-disk configuration file
//!
//! ```json
//! {
//!   "servers": [
//!     { "name": "browser", "url": "http://localhost", "port": 3001 }
//!   ],
//!   "restricted": { "name": "rag", "url": "http://localhost", "port": 8001 },
//!   "settings": { "tool_call_timeout_ms": 30000 }
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{RestrictedServerSpec, ServerConfig};
use crate::error::ConfigurationError;

/// Timeouts and retry policy for the connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Bound on a single handshake + tool listing
    pub connect_timeout_ms: u64,
    /// Handshake attempts per server during initialization
    pub connect_attempts: u32,
    /// Linear backoff step between handshake attempts
    pub retry_backoff_ms: u64,
    /// Bound on a single liveness probe
    pub probe_timeout_ms: u64,
    /// A successful probe younger than this skips re-probing
    pub health_check_ttl_ms: u64,
    pub tool_call_timeout_ms: u64,
    /// Suggested tick for the collaborator's health-check timer
    pub health_check_interval_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            connect_attempts: 3,
            retry_backoff_ms: 500,
            probe_timeout_ms: 5_000,
            health_check_ttl_ms: 5_000,
            tool_call_timeout_ms: 60_000,
            health_check_interval_secs: 30,
        }
    }
}

impl PoolSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_check_ttl(&self) -> Duration {
        Duration::from_millis(self.health_check_ttl_ms)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_call_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Pause before retry number `attempt`. Grows linearly but never past
    /// one handshake timeout.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff()
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
            .min(self.connect_timeout())
    }

    /// At least one handshake attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.connect_attempts.max(1)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolmuxConfig {
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub restricted: Option<RestrictedServerSpec>,
    #[serde(default)]
    pub settings: PoolSettings,
}

impl ToolmuxConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let load_error = |message: String| ConfigurationError::Load {
            path: path.display().to_string(),
            message,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let config: ToolmuxConfig =
            serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(restricted) = &self.restricted {
            restricted.validate()?;
        }
        validate_server_configs(
            &self.servers,
            self.restricted.as_ref().map(|r| r.name.as_str()),
        )
    }
}

/// Validate a server list as a whole: every entry well-formed, names
/// unique, and none shadowing the restricted server.
pub fn validate_server_configs(
    servers: &[ServerConfig],
    restricted_name: Option<&str>,
) -> Result<(), ConfigurationError> {
    if servers.is_empty() {
        return Err(ConfigurationError::NoServers);
    }

    let mut seen = HashSet::new();
    for server in servers {
        server.validate()?;
        if Some(server.name.as_str()) == restricted_name {
            return Err(ConfigurationError::ReservedName {
                name: server.name.clone(),
            });
        }
        if !seen.insert(server.name.as_str()) {
            return Err(ConfigurationError::DuplicateServer {
                name: server.name.clone(),
            });
        }
    }
    Ok(())
}
