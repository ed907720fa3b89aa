//! HTTP transport for MCP servers
//!
//! Connects over Streamable HTTP using RMCP. Config headers (including the
//! restricted server's bearer token) are baked into the underlying
//! `reqwest::Client` so they go out on every request.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::{CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{NotificationContext, Peer, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use toolmux_core::ServerConfig;
use tracing::{debug, error, info, warn};

use super::{McpSession, ToolCallResult, ToolDescriptor, Transport, TransportConnectResult};

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// Client handler for pool connections
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_name: String,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(server_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("toolmux-{}", server_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("Toolmux".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            server_name: server_name.to_string(),
        }
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_name = self.server_name.clone();
        async move {
            // Tool lists are refreshed on reconnection only.
            info!(
                server = %server_name,
                "[McpClientHandler] Server sent tools/list_changed; tools refresh on next reconnect"
            );
        }
    }
}

/// Streamable HTTP transport
pub struct StreamableHttpTransport;

impl StreamableHttpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Build a reqwest HeaderMap from config headers.
    fn build_default_headers(config: &ServerConfig) -> Result<reqwest::header::HeaderMap, String> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            let header_name =
                reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    format!("Invalid header name '{}': {}", key, e)
                })?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| format!("Invalid header value for '{}': {}", key, e))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }

    fn build_http_client(header_map: reqwest::header::HeaderMap) -> Result<reqwest::Client, String> {
        reqwest::Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))
    }
}

impl Default for StreamableHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn connect(&self, config: &ServerConfig) -> TransportConnectResult {
        let url = match config.mcp_url() {
            Ok(url) => url,
            Err(e) => return TransportConnectResult::Failed(e.to_string()),
        };
        let health_url = match config.health_url() {
            Ok(url) => url,
            Err(e) => return TransportConnectResult::Failed(e.to_string()),
        };

        info!(server = %config.name, url = %url, "Connecting to HTTP server");

        let header_map = match Self::build_default_headers(config) {
            Ok(h) => h,
            Err(err) => {
                error!(server = %config.name, "{}", err);
                return TransportConnectResult::Failed(err);
            }
        };
        let header_count = header_map.len();
        let http = match Self::build_http_client(header_map) {
            Ok(c) => c,
            Err(err) => {
                error!(server = %config.name, "{}", err);
                return TransportConnectResult::Failed(err);
            }
        };

        let transport_config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
        let transport = StreamableHttpClientTransport::with_client(http.clone(), transport_config);

        match McpClientHandler::new(&config.name).serve(transport).await {
            Ok(client) => {
                debug!(
                    server = %config.name,
                    header_count,
                    peer_info = ?client.peer_info(),
                    "HTTP server connected"
                );
                TransportConnectResult::Connected(Arc::new(RmcpSession::new(
                    config.name.clone(),
                    client,
                    http,
                    health_url.map(|u| u.to_string()),
                )))
            }
            Err(e) => {
                let err = format!("HTTP connection failed: {:#}", e);
                warn!(server = %config.name, "{}", err);
                TransportConnectResult::Failed(err)
            }
        }
    }

    fn description(&self, config: &ServerConfig) -> String {
        match config.mcp_url() {
            Ok(url) => format!("http:{}", url),
            Err(_) => format!("http:{}:{}", config.url, config.port),
        }
    }
}

/// A connected RMCP client session
pub struct RmcpSession {
    server_name: String,
    peer: Peer<RoleClient>,
    /// Taken on close; the running service is cancelled exactly once
    service: Mutex<Option<McpClient>>,
    http: reqwest::Client,
    health_url: Option<String>,
}

impl RmcpSession {
    pub fn new(
        server_name: String,
        client: McpClient,
        http: reqwest::Client,
        health_url: Option<String>,
    ) -> Self {
        Self {
            server_name,
            peer: client.peer().clone(),
            service: Mutex::new(Some(client)),
            http,
            health_url,
        }
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let tools = self
            .peer
            .list_all_tools()
            .await
            .context("Failed to list tools")?;

        Ok(tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.to_string(),
                description: tool.description.as_ref().map(|d| d.to_string()),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolCallResult> {
        debug!(server = %self.server_name, tool = %name, "Calling tool");

        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                name: name.to_string().into(),
                arguments,
                task: None,
                meta: None,
            })
            .await
            .context("Tool call failed")?;

        Ok(ToolCallResult {
            content: result
                .content
                .into_iter()
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                .collect(),
            structured_content: result.structured_content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn health_check(&self) -> Result<()> {
        if let Some(url) = &self.health_url {
            self.http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("Health endpoint {} failed", url))?;
        }
        self.peer
            .list_all_tools()
            .await
            .context("Session probe failed")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let service = self.service.lock().take();
        match service {
            Some(service) => {
                info!(server = %self.server_name, "Disconnecting from MCP server");
                service
                    .cancel()
                    .await
                    .map_err(|e| anyhow!("Failed to cancel service: {}", e))?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
