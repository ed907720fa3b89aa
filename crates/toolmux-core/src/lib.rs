//! # Toolmux Core Library
//!
//! Domain types shared by the connection pool and its collaborators.
//!
//! ## Modules
//!
//! - `domain` - Server configs, tools, call results, connection status
//! - `config` - Pool settings and the JSON configuration file
//! - `error` - Connection, tool and configuration error taxonomy

pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use config::{validate_server_configs, PoolSettings, ToolmuxConfig};
pub use domain::*;
pub use error::{ConfigurationError, ConnectionError, McpError, McpResult, ToolError};
