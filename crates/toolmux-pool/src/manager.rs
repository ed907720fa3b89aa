//! MCP Manager - the single entry point of the pool
//!
//! Composes router, registry, orchestrator and invoker, and tracks the
//! authorization token that gates the restricted server. Owns no timer:
//! collaborators drive `perform_health_checks` on their own schedule.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use toolmux_core::{
    validate_server_configs, CallResult, ConnectionStatus, McpError, McpResult, PoolSettings,
    RestrictedServerSpec, ServerConfig, Tool, ToolOutput,
};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionManager};
use crate::invoker::ToolInvoker;
use crate::orchestrator::{ConnectionOrchestrator, HealthCheckReport, InitializeReport};
use crate::registry::ToolRegistry;
use crate::router::ToolRouter;
use crate::transport::{StreamableHttpTransport, Transport};

pub struct McpManager {
    settings: PoolSettings,
    restricted: Option<RestrictedServerSpec>,
    router: Arc<ToolRouter>,
    registry: Arc<ToolRegistry>,
    orchestrator: Arc<ConnectionOrchestrator>,
    invoker: ToolInvoker,
    auth_token: RwLock<Option<String>>,
    /// Serializes restricted-server membership changes
    token_update: tokio::sync::Mutex<()>,
    /// Serializes initialize / disconnect; acquired before `token_update`
    lifecycle: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
}

impl McpManager {
    pub fn new(
        settings: PoolSettings,
        restricted: Option<RestrictedServerSpec>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new(transport, &settings));
        let orchestrator = Arc::new(ConnectionOrchestrator::new(
            connection_manager,
            settings.clone(),
        ));
        let router = Arc::new(ToolRouter::new());
        let registry = Arc::new(ToolRegistry::new(Arc::clone(&router)));
        let invoker = ToolInvoker::new(
            Arc::clone(&router),
            Arc::clone(&registry),
            Arc::clone(&orchestrator),
            settings.tool_call_timeout(),
        );

        Self {
            settings,
            restricted,
            router,
            registry,
            orchestrator,
            invoker,
            auth_token: RwLock::new(None),
            token_update: tokio::sync::Mutex::new(()),
            lifecycle: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Manager speaking MCP over Streamable HTTP
    pub fn with_http_transport(
        settings: PoolSettings,
        restricted: Option<RestrictedServerSpec>,
    ) -> Self {
        Self::new(settings, restricted, Arc::new(StreamableHttpTransport::new()))
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token.read().is_some()
    }

    /// Validate every config, then connect all servers in parallel.
    ///
    /// If a token was set beforehand, the restricted server is connected
    /// alongside the others.
    pub async fn initialize(&self, configs: Vec<ServerConfig>) -> McpResult<InitializeReport> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_initialized() {
            return Err(McpError::AlreadyInitialized);
        }

        if let Some(spec) = &self.restricted {
            spec.validate()?;
        }
        validate_server_configs(&configs, self.restricted_name())?;

        let _token_guard = self.token_update.lock().await;
        let mut configs = configs;
        let token = self.auth_token.read().clone();
        if let Some(spec) = &self.restricted {
            if let Some(token) = token {
                debug!(server = %spec.name, "[McpManager] Token present; restricted server joins initialization");
                configs.push(spec.build_config(&token));
            }
        }

        let report = match self.orchestrator.initialize_connections(&configs).await {
            Ok(report) => report,
            Err(e) => {
                self.orchestrator.disconnect_all().await;
                return Err(e.into());
            }
        };

        self.registry
            .register_connections(self.orchestrator.connections());
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            connected = ?report.connected,
            tool_count = self.registry.get_all_tools().len(),
            "[McpManager] Initialized"
        );
        Ok(report)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallResult<ToolOutput> {
        self.invoker.invoke_tool(name, arguments).await
    }

    pub fn get_all_tools(&self) -> BTreeMap<String, Tool> {
        self.registry.get_all_tools()
    }

    pub fn get_status(&self) -> BTreeMap<String, ConnectionStatus> {
        self.orchestrator.get_status()
    }

    pub fn get_connection(&self, server_name: &str) -> Option<Arc<Connection>> {
        self.orchestrator.get_connection(server_name)
    }

    /// Set or clear the session token, moving the restricted server in or
    /// out of the pool. Other servers are never touched. Connection
    /// failures are logged, not returned.
    pub async fn update_auth_token(&self, token: Option<String>) {
        let _token_guard = self.token_update.lock().await;

        let token = token.filter(|t| !t.trim().is_empty());
        let previous = std::mem::replace(&mut *self.auth_token.write(), token.clone());

        let Some(spec) = &self.restricted else {
            warn!("[McpManager] Auth token stored but no restricted server is configured");
            return;
        };
        if !self.is_initialized() {
            debug!(server = %spec.name, "[McpManager] Auth token stored; applied at initialize");
            return;
        }

        match token {
            Some(token) => self.connect_restricted(spec, &token, previous.as_deref()).await,
            None => {
                if self.orchestrator.disconnect_server(&spec.name).await {
                    info!(server = %spec.name, "[McpManager] Auth token cleared; restricted server removed");
                }
                self.registry
                    .register_connections(self.orchestrator.connections());
            }
        }
    }

    async fn connect_restricted(&self, spec: &RestrictedServerSpec, token: &str, previous: Option<&str>) {
        let live = self
            .orchestrator
            .get_connection(&spec.name)
            .is_some_and(|c| c.is_connected());
        if live && previous == Some(token) {
            debug!(server = %spec.name, "[McpManager] Token unchanged; keeping connection");
            return;
        }

        // Credentials changed: the old session must not outlive its token.
        if self.orchestrator.get_connection(&spec.name).is_some() {
            self.orchestrator.disconnect_server(&spec.name).await;
        }

        match self.orchestrator.connect_server(spec.build_config(token)).await {
            Ok(connection) => {
                let tools: Vec<&str> = connection.tools().map(|t| t.name.as_str()).collect();
                info!(
                    server = %spec.name,
                    tools = ?tools,
                    "[McpManager] Restricted server connected"
                );
            }
            Err(e) => {
                warn!(server = %spec.name, error = %e, "[McpManager] Restricted server unavailable");
            }
        }
        self.registry
            .register_connections(self.orchestrator.connections());
    }

    /// Probe every connection and repair what failed.
    pub async fn perform_health_checks(&self) -> HealthCheckReport {
        let report = self.orchestrator.perform_health_checks().await;
        self.registry
            .register_connections(self.orchestrator.connections());
        report
    }

    /// Tear down every connection. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let _token_guard = self.token_update.lock().await;

        let was_initialized = self.initialized.swap(false, Ordering::SeqCst);
        self.orchestrator.disconnect_all().await;
        self.registry.clear();
        self.router.clear_cache();

        if was_initialized {
            info!("[McpManager] Disconnected");
        }
    }

    fn restricted_name(&self) -> Option<&str> {
        self.restricted.as_ref().map(|r| r.name.as_str())
    }
}
