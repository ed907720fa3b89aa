//! Transport abstraction for MCP connections
//!
//! A `Transport` turns a [`ServerConfig`] into a live [`McpSession`]. The pool
//! only ever talks to sessions through this trait, so alternative transports
//! (and scripted test doubles) plug in without touching connection logic.

mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use toolmux_core::ServerConfig;

pub use http::{McpClient, McpClientHandler, RmcpSession, StreamableHttpTransport};

/// Tool as advertised by a server, before namespacing
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

/// Raw result of a `tools/call` request
#[derive(Debug, Clone, Default)]
pub struct ToolCallResult {
    pub content: Vec<Value>,
    pub structured_content: Option<Value>,
    /// Protocol-level error flag (`isError`)
    pub is_error: bool,
}

/// A live RPC session to one tool server
#[async_trait]
pub trait McpSession: Send + Sync {
    /// List every tool the server currently exposes
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool by its server-local name
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolCallResult>;

    /// Lightweight liveness probe
    async fn health_check(&self) -> Result<()>;

    /// Release the session
    async fn close(&self) -> Result<()>;
}

/// Result of a transport connection attempt
pub enum TransportConnectResult {
    /// Handshake completed
    Connected(Arc<dyn McpSession>),
    /// Connection failed
    Failed(String),
}

/// Transport trait for MCP connections
///
/// Implementations perform exactly one handshake per call; retry and
/// timeout policy belong to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt to connect to the server described by `config`
    async fn connect(&self, config: &ServerConfig) -> TransportConnectResult;

    /// Short description for logging, e.g. `http:http://localhost:8001/mcp`
    fn description(&self, config: &ServerConfig) -> String;
}
