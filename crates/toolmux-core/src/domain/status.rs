use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only snapshot of one server's connection, recomputed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub tool_count: usize,
    /// Time of the last successful health probe
    pub last_check: Option<DateTime<Utc>>,
    /// Failed probes on the current connection
    pub error_count: u32,
}

impl ConnectionStatus {
    /// Status of a server that was requested but is not in the pool.
    pub fn absent() -> Self {
        Self::default()
    }
}
