//! Error taxonomy shared by the pool and its collaborators.
//!
//! Every variant carries owned strings so errors can be cloned into a
//! [`CallResult`](crate::CallResult) and handed across task boundaries.

use std::time::Duration;

use thiserror::Error;

/// Transport, handshake and health failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("handshake with '{server}' failed: {message}")]
    Handshake { server: String, message: String },

    #[error("connecting to '{server}' timed out after {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    #[error("tool discovery on '{server}' failed: {message}")]
    Discovery { server: String, message: String },

    #[error("server '{server}' is unavailable: {message}")]
    Unavailable { server: String, message: String },

    #[error("no tool servers could be connected ({})", format_failures(.failures))]
    NoServersConnected { failures: Vec<(String, String)> },
}

impl ConnectionError {
    /// Server the error refers to, if any.
    pub fn server(&self) -> Option<&str> {
        match self {
            ConnectionError::Handshake { server, .. }
            | ConnectionError::Timeout { server, .. }
            | ConnectionError::Discovery { server, .. }
            | ConnectionError::Unavailable { server, .. } => Some(server),
            ConnectionError::NoServersConnected { .. } => None,
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    if failures.is_empty() {
        return "no servers attempted".to_string();
    }
    failures
        .iter()
        .map(|(server, reason)| format!("{}: {}", server, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("malformed tool name '{name}' (expected 'server:tool')")]
    InvalidName { name: String },

    #[error("arguments for '{tool}' must be a JSON object")]
    InvalidArguments { tool: String },

    #[error("tool '{name}' not found")]
    NotFound { name: String },

    #[error("tool '{tool}' reported an error: {message}")]
    Execution { tool: String, message: String },

    #[error("call to '{tool}' failed: {message}")]
    CallFailed { tool: String, message: String },

    #[error("call to '{tool}' timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
}

/// Invalid server configuration shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("server config is missing '{field}'")]
    MissingField { field: &'static str },

    #[error("invalid server name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid url '{url}' for server '{server}': {reason}")]
    InvalidUrl {
        server: String,
        url: String,
        reason: String,
    },

    #[error("server '{server}' has invalid port {port}")]
    InvalidPort { server: String, port: u16 },

    #[error("server '{server}' has invalid endpoint '{endpoint}' (must start with '/')")]
    InvalidEndpoint { server: String, endpoint: String },

    #[error("server '{name}' is configured more than once")]
    DuplicateServer { name: String },

    #[error("server name '{name}' is reserved for the restricted server")]
    ReservedName { name: String },

    #[error("no servers configured")]
    NoServers,

    #[error("failed to load config from {path}: {message}")]
    Load { path: String, message: String },
}

/// Umbrella error returned by the manager facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("manager is already initialized; call disconnect() first")]
    AlreadyInitialized,
}

pub type McpResult<T> = Result<T, McpError>;
