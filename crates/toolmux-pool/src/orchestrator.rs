//! Connection Orchestrator - owner of the live connection map
//!
//! Per-server state machine:
//!
//! ```text
//! absent ──initialize / connect_server──▶ connecting ──ok──▶ connected
//!    ▲                                        │                │  ▲
//!    │                                      failed       probe │  │ reconnect ok
//!    │                                        ▼          failed▼  │
//!    └──────────────── reconnect failed ◀── absent      degraded ─┘
//! ```
//!
//! The map is the only shared mutable resource. Its lock is never held
//! across an await; reconnection replaces an entry with a single write, and
//! only if the entry is still the connection that was found degraded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use toolmux_core::{ConnectionError, ConnectionStatus, PoolSettings, ServerConfig};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionManager};

/// Shared handle to the live connection map
pub type ConnectionMap = Arc<RwLock<HashMap<String, Arc<Connection>>>>;

/// Result of parallel initialization
#[derive(Debug, Default)]
pub struct InitializeReport {
    pub connected: Vec<String>,
    pub failed: Vec<(String, ConnectionError)>,
}

/// Result of one health sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthCheckReport {
    pub healthy: Vec<String>,
    pub reconnected: Vec<String>,
    /// Servers whose reconnection failed and that left the pool
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthOutcome {
    Healthy,
    Reconnected,
    Dropped,
}

/// Drives initialization, health checks, reconnection and dynamic
/// membership for the whole pool.
pub struct ConnectionOrchestrator {
    connection_manager: Arc<ConnectionManager>,
    connections: ConnectionMap,
    /// Every server requested into the pool, connected or not
    configs: RwLock<BTreeMap<String, ServerConfig>>,
    /// Serializes reconnection per server
    repair_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    settings: PoolSettings,
}

impl ConnectionOrchestrator {
    pub fn new(connection_manager: Arc<ConnectionManager>, settings: PoolSettings) -> Self {
        Self {
            connection_manager,
            connections: Arc::new(RwLock::new(HashMap::new())),
            configs: RwLock::new(BTreeMap::new()),
            repair_locks: DashMap::new(),
            settings,
        }
    }

    /// Handle to the live map (shared, never a snapshot)
    pub fn connections(&self) -> ConnectionMap {
        Arc::clone(&self.connections)
    }

    pub fn get_connection(&self, server_name: &str) -> Option<Arc<Connection>> {
        self.connections.read().get(server_name).cloned()
    }

    pub fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connect every server in parallel.
    ///
    /// Servers that cannot be reached are left out of the pool. Fails only
    /// when no server at all could be connected.
    pub async fn initialize_connections(
        &self,
        configs: &[ServerConfig],
    ) -> Result<InitializeReport, ConnectionError> {
        info!(
            "[Orchestrator] Initializing {} server(s): {:?}",
            configs.len(),
            configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );

        {
            let mut known = self.configs.write();
            for config in configs {
                known.insert(config.name.clone(), config.clone());
            }
        }

        let results = join_all(configs.iter().map(|config| async move {
            (config.name.clone(), self.connect_with_retry(config).await)
        }))
        .await;

        let mut report = InitializeReport::default();
        for (name, result) in results {
            match result {
                Ok(connection) => {
                    self.install(connection).await;
                    report.connected.push(name);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "[Orchestrator] Server omitted from pool");
                    report.failed.push((name, e));
                }
            }
        }

        if report.connected.is_empty() {
            return Err(ConnectionError::NoServersConnected {
                failures: report
                    .failed
                    .iter()
                    .map(|(name, e)| (name.clone(), e.to_string()))
                    .collect(),
            });
        }

        info!(
            connected = report.connected.len(),
            failed = report.failed.len(),
            "[Orchestrator] Initialization complete"
        );
        Ok(report)
    }

    /// Add (or replace) a single server without touching the others.
    pub async fn connect_server(&self, config: ServerConfig) -> Result<Arc<Connection>, ConnectionError> {
        self.configs
            .write()
            .insert(config.name.clone(), config.clone());

        let connection = self.connect_with_retry(&config).await?;
        Ok(self.install(connection).await)
    }

    /// Remove a single server from the pool and close its connection.
    ///
    /// Returns whether a live connection was removed.
    pub async fn disconnect_server(&self, server_name: &str) -> bool {
        self.forget_server(server_name);
        let removed = self.connections.write().remove(server_name);
        self.repair_locks.remove(server_name);

        match removed {
            Some(connection) => {
                info!(server = %server_name, "[Orchestrator] Disconnecting server");
                self.connection_manager.close_connection(&connection).await;
                true
            }
            None => false,
        }
    }

    /// Stop reporting a server in `get_status`; its connection, if any, is
    /// left alone.
    pub fn forget_server(&self, server_name: &str) -> bool {
        self.configs.write().remove(server_name).is_some()
    }

    /// Close every connection and forget all servers.
    pub async fn disconnect_all(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut map = self.connections.write();
            map.drain().map(|(_, conn)| conn).collect()
        };
        self.configs.write().clear();
        self.repair_locks.clear();

        if drained.is_empty() {
            return;
        }
        info!("[Orchestrator] Disconnecting {} server(s)", drained.len());
        join_all(
            drained
                .iter()
                .map(|conn| self.connection_manager.close_connection(conn)),
        )
        .await;
    }

    /// `true` if the connection is usable, repairing it if needed.
    ///
    /// Skips the network when a probe succeeded within the health-check TTL.
    /// Otherwise probes, and on failure runs exactly one reconnection cycle.
    /// A successful repair swaps a new connection into the map, so callers
    /// must re-resolve afterwards.
    pub async fn ensure_connection_health(&self, connection: &Arc<Connection>) -> bool {
        if connection.is_fresh(self.settings.health_check_ttl()) {
            return true;
        }
        self.check_and_repair(connection).await != HealthOutcome::Dropped
    }

    /// Probe every connection concurrently and repair failures.
    pub async fn perform_health_checks(&self) -> HealthCheckReport {
        let snapshot: Vec<Arc<Connection>> = self.connections.read().values().cloned().collect();
        debug!("[Orchestrator] Health sweep over {} connection(s)", snapshot.len());

        let outcomes = join_all(snapshot.iter().map(|conn| async move {
            (conn.server_name().to_string(), self.check_and_repair(conn).await)
        }))
        .await;

        let mut report = HealthCheckReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                HealthOutcome::Healthy => report.healthy.push(name),
                HealthOutcome::Reconnected => report.reconnected.push(name),
                HealthOutcome::Dropped => report.dropped.push(name),
            }
        }
        report.healthy.sort();
        report.reconnected.sort();
        report.dropped.sort();

        if !report.reconnected.is_empty() || !report.dropped.is_empty() {
            info!(
                reconnected = ?report.reconnected,
                dropped = ?report.dropped,
                "[Orchestrator] Health sweep repaired connections"
            );
        }
        report
    }

    /// Status of every requested server; absent ones report disconnected.
    pub fn get_status(&self) -> BTreeMap<String, ConnectionStatus> {
        let connections = self.connections.read();
        let mut statuses: BTreeMap<String, ConnectionStatus> = self
            .configs
            .read()
            .keys()
            .map(|name| (name.clone(), ConnectionStatus::absent()))
            .collect();
        for (name, conn) in connections.iter() {
            statuses.insert(name.clone(), conn.status());
        }
        statuses
    }

    async fn check_and_repair(&self, connection: &Arc<Connection>) -> HealthOutcome {
        if self.connection_manager.test_connection(connection).await {
            return HealthOutcome::Healthy;
        }
        if self.reconnect(connection).await {
            HealthOutcome::Reconnected
        } else {
            HealthOutcome::Dropped
        }
    }

    /// One reconnection cycle for a degraded connection.
    async fn reconnect(&self, stale: &Arc<Connection>) -> bool {
        let name = stale.server_name().to_string();
        let lock = self.repair_lock(&name);
        let _guard = lock.lock().await;

        // Another caller may have repaired or removed the server meanwhile.
        let current = self.connections.read().get(&name).cloned();
        match current {
            None => {
                debug!(server = %name, "[Orchestrator] Server left the pool; not reconnecting");
                return false;
            }
            Some(current) if !Arc::ptr_eq(&current, stale) => {
                debug!(server = %name, "[Orchestrator] Connection already replaced");
                return current.is_connected();
            }
            Some(_) => {}
        }

        info!(server = %name, "[Orchestrator] Reconnecting degraded server");
        self.connection_manager.close_connection(stale).await;

        match self.connection_manager.create_connection(stale.config()).await {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                let swapped = {
                    let mut map = self.connections.write();
                    match map.get(&name) {
                        Some(current) if Arc::ptr_eq(current, stale) => {
                            map.insert(name.clone(), Arc::clone(&fresh));
                            true
                        }
                        _ => false,
                    }
                };

                if !swapped {
                    debug!(server = %name, "[Orchestrator] Server removed during reconnect; discarding");
                    self.connection_manager.close_connection(&fresh).await;
                    return false;
                }

                info!(
                    server = %name,
                    tool_count = fresh.tool_count(),
                    "[Orchestrator] Reconnected"
                );
                true
            }
            Err(e) => {
                warn!(server = %name, error = %e, "[Orchestrator] Reconnect failed; dropping server from pool");
                let mut map = self.connections.write();
                if map.get(&name).is_some_and(|current| Arc::ptr_eq(current, stale)) {
                    map.remove(&name);
                }
                false
            }
        }
    }

    async fn connect_with_retry(&self, config: &ServerConfig) -> Result<Connection, ConnectionError> {
        let attempts = self.settings.attempts();
        let mut attempt = 1;
        loop {
            match self.connection_manager.create_connection(config).await {
                Ok(connection) => return Ok(connection),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let backoff = self.settings.backoff_for(attempt);
                    debug!(
                        server = %config.name,
                        attempt,
                        attempts,
                        error = %e,
                        ?backoff,
                        "[Orchestrator] Connect attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Put a new connection in the map, closing any connection it replaces.
    async fn install(&self, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        let previous = self
            .connections
            .write()
            .insert(connection.server_name().to_string(), Arc::clone(&connection));

        if let Some(previous) = previous {
            debug!(server = %connection.server_name(), "[Orchestrator] Replacing existing connection");
            self.connection_manager.close_connection(&previous).await;
        }
        connection
    }

    fn repair_lock(&self, server_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.repair_locks
            .entry(server_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .value()
            .clone()
    }
}
