//! Toolmux Pool
//!
//! Client-side multiplexer for MCP tool servers:
//! - One live Streamable HTTP session per server, connected in parallel
//! - Tool discovery under `server:tool` namespaces
//! - Tool calls with timeout, health check and one-shot reconnection
//! - Runtime add/remove of the authorization-gated server
//!
//! [`McpManager`] is the only entry point collaborators need.

mod connection;
mod invoker;
mod manager;
mod orchestrator;
mod registry;
mod router;
pub mod transport;

pub use connection::{Connection, ConnectionManager};
pub use invoker::ToolInvoker;
pub use manager::McpManager;
pub use orchestrator::{ConnectionMap, ConnectionOrchestrator, HealthCheckReport, InitializeReport};
pub use registry::ToolRegistry;
pub use router::{ParsedToolName, ToolRouter};
pub use transport::{
    McpSession, StreamableHttpTransport, ToolCallResult, ToolDescriptor, Transport,
    TransportConnectResult,
};

// Domain types callers need alongside the manager
pub use toolmux_core::{
    CallResult, ConnectionError, ConnectionStatus, McpError, PoolSettings, RestrictedServerSpec,
    ServerConfig, Tool, ToolError, ToolOutput,
};
