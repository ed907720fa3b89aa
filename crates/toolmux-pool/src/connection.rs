//! Connection Manager - Handles one physical connection per server
//!
//! ConnectionManager is responsible for:
//! - Opening a session through the transport and discovering its tools
//! - Probing liveness of an established connection
//! - Closing connections without ever blocking the rest of the pool
//!
//! It knows nothing about other servers; retry policy lives in the
//! orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use toolmux_core::{ConnectionError, ConnectionStatus, PoolSettings, ServerConfig, Tool};
use tracing::{debug, info, warn};

use crate::router::ToolRouter;
use crate::transport::{McpSession, Transport, TransportConnectResult};

/// Mutable health bookkeeping for a connection
#[derive(Debug, Clone)]
struct HealthState {
    is_connected: bool,
    last_health_check: Option<Instant>,
    last_check_at: Option<DateTime<Utc>>,
    connection_attempts: u32,
}

/// One live (or recently live) session to a server.
///
/// Tools are fixed for the lifetime of the object; reconnection builds a new
/// `Connection` and swaps it into the pool instead of patching this one.
pub struct Connection {
    server_name: String,
    session: Arc<dyn McpSession>,
    transport: String,
    config: ServerConfig,
    /// Tools keyed by original (server-local) name
    tools: BTreeMap<String, Tool>,
    health: RwLock<HealthState>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server_name", &self.server_name)
            .field("transport", &self.transport)
            .field("tools", &self.tools.len())
            .field("health", &*self.health.read())
            .finish()
    }
}

impl Connection {
    pub fn new(
        config: ServerConfig,
        session: Arc<dyn McpSession>,
        transport: String,
        tools: impl IntoIterator<Item = Tool>,
    ) -> Self {
        let mut by_name = BTreeMap::new();
        for tool in tools {
            if !ToolRouter::is_routable_name(&tool.original_name) {
                warn!(
                    server = %config.name,
                    tool = %tool.original_name,
                    "Server listed a tool whose name cannot be routed; skipping"
                );
                continue;
            }
            if by_name.contains_key(&tool.original_name) {
                warn!(
                    server = %config.name,
                    tool = %tool.original_name,
                    "Server listed a tool twice; keeping the first"
                );
                continue;
            }
            by_name.insert(tool.original_name.clone(), tool);
        }

        Self {
            server_name: config.name.clone(),
            session,
            transport,
            config,
            tools: by_name,
            health: RwLock::new(HealthState {
                is_connected: true,
                last_health_check: Some(Instant::now()),
                last_check_at: Some(Utc::now()),
                connection_attempts: 0,
            }),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn session(&self) -> &Arc<dyn McpSession> {
        &self.session
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Whether this connection lists a tool under its server-local name
    pub fn has_tool(&self, original_name: &str) -> bool {
        self.tools.contains_key(original_name)
    }

    pub fn is_connected(&self) -> bool {
        self.health.read().is_connected
    }

    pub fn connection_attempts(&self) -> u32 {
        self.health.read().connection_attempts
    }

    /// Instant of the last successful probe (or of the handshake)
    pub fn last_health_check(&self) -> Option<Instant> {
        self.health.read().last_health_check
    }

    /// Connected and probed successfully within `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let health = self.health.read();
        health.is_connected
            && health
                .last_health_check
                .is_some_and(|at| at.elapsed() < ttl)
    }

    /// Forget the last successful probe so the next health check goes to
    /// the network.
    pub fn mark_stale(&self) {
        self.health.write().last_health_check = None;
    }

    pub fn status(&self) -> ConnectionStatus {
        let health = self.health.read();
        ConnectionStatus {
            connected: health.is_connected,
            tool_count: self.tools.len(),
            last_check: health.last_check_at,
            error_count: health.connection_attempts,
        }
    }

    fn record_probe_success(&self) {
        let mut health = self.health.write();
        health.is_connected = true;
        health.last_health_check = Some(Instant::now());
        health.last_check_at = Some(Utc::now());
    }

    fn record_probe_failure(&self) {
        let mut health = self.health.write();
        health.is_connected = false;
        health.connection_attempts = health.connection_attempts.saturating_add(1);
    }

    fn mark_closed(&self) {
        self.health.write().is_connected = false;
    }
}

/// Establishes, probes and closes individual connections
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, settings: &PoolSettings) -> Self {
        Self {
            transport,
            connect_timeout: settings.connect_timeout(),
            probe_timeout: settings.probe_timeout(),
        }
    }

    /// Open a session, perform the handshake and discover tools.
    ///
    /// Makes exactly one attempt, bounded by the connect timeout.
    pub async fn create_connection(&self, config: &ServerConfig) -> Result<Connection, ConnectionError> {
        let description = self.transport.description(config);
        info!(
            "[ConnectionManager] Connecting {} via {}",
            config.name, description
        );

        let session = match tokio::time::timeout(self.connect_timeout, self.transport.connect(config)).await {
            Ok(TransportConnectResult::Connected(session)) => session,
            Ok(TransportConnectResult::Failed(message)) => {
                warn!(server = %config.name, error = %message, "[ConnectionManager] Handshake failed");
                return Err(ConnectionError::Handshake {
                    server: config.name.clone(),
                    message,
                });
            }
            Err(_) => {
                warn!(server = %config.name, timeout = ?self.connect_timeout, "[ConnectionManager] Handshake timed out");
                return Err(ConnectionError::Timeout {
                    server: config.name.clone(),
                    timeout: self.connect_timeout,
                });
            }
        };

        let descriptors = match tokio::time::timeout(self.connect_timeout, session.list_tools()).await {
            Ok(Ok(descriptors)) => descriptors,
            Ok(Err(e)) => {
                Self::close_session(&config.name, &session, self.probe_timeout).await;
                return Err(ConnectionError::Discovery {
                    server: config.name.clone(),
                    message: format!("{:#}", e),
                });
            }
            Err(_) => {
                Self::close_session(&config.name, &session, self.probe_timeout).await;
                return Err(ConnectionError::Timeout {
                    server: config.name.clone(),
                    timeout: self.connect_timeout,
                });
            }
        };

        let tools = descriptors
            .into_iter()
            .map(|d| Tool::new(config.name.clone(), d.name, d.description, d.input_schema));
        let connection = Connection::new(config.clone(), session, description, tools);

        info!(
            server = %config.name,
            tool_count = connection.tool_count(),
            "[ConnectionManager] Connected"
        );
        Ok(connection)
    }

    /// Probe liveness; updates the connection's health state, never errors.
    pub async fn test_connection(&self, connection: &Connection) -> bool {
        let outcome = tokio::time::timeout(self.probe_timeout, connection.session().health_check()).await;
        match outcome {
            Ok(Ok(())) => {
                connection.record_probe_success();
                debug!(server = %connection.server_name(), "[ConnectionManager] Probe ok");
                true
            }
            Ok(Err(e)) => {
                connection.record_probe_failure();
                warn!(
                    server = %connection.server_name(),
                    error = %format!("{:#}", e),
                    attempts = connection.connection_attempts(),
                    "[ConnectionManager] Probe failed"
                );
                false
            }
            Err(_) => {
                connection.record_probe_failure();
                warn!(
                    server = %connection.server_name(),
                    timeout = ?self.probe_timeout,
                    attempts = connection.connection_attempts(),
                    "[ConnectionManager] Probe timed out"
                );
                false
            }
        }
    }

    /// Release the transport. Errors are logged, never surfaced.
    pub async fn close_connection(&self, connection: &Connection) {
        connection.mark_closed();
        Self::close_session(connection.server_name(), connection.session(), self.probe_timeout).await;
    }

    async fn close_session(server: &str, session: &Arc<dyn McpSession>, timeout: Duration) {
        match tokio::time::timeout(timeout, session.close()).await {
            Ok(Ok(())) => debug!(server = %server, "[ConnectionManager] Session closed"),
            Ok(Err(e)) => warn!(server = %server, error = %e, "[ConnectionManager] Failed to close session"),
            Err(_) => warn!(server = %server, "[ConnectionManager] Timed out closing session"),
        }
    }
}
