//! Tool server configuration
//!
//! A `ServerConfig` identifies one remote MCP server reachable over
//! Streamable HTTP. Configs are immutable once built; the pool keys
//! everything by `name`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigurationError;

/// Separator between server name and tool name in namespaced tool names.
pub const TOOL_NAME_SEPARATOR: char = ':';

fn default_mcp_endpoint() -> String {
    "/mcp".to_string()
}

/// Configuration for a single tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name, also the tool namespace prefix
    pub name: String,
    /// Base URL without port, e.g. `http://localhost`
    pub url: String,
    pub port: u16,
    /// Optional plain HTTP liveness endpoint, e.g. `/health`
    #[serde(default)]
    pub health_endpoint: Option<String>,
    #[serde(default = "default_mcp_endpoint")]
    pub mcp_endpoint: String,
    /// Credentials and settings associated with this server
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Headers sent on every request to the server
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            port,
            health_endpoint: None,
            mcp_endpoint: default_mcp_endpoint(),
            env: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_mcp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.mcp_endpoint = endpoint.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Full URL of the MCP endpoint (base url + port + endpoint path)
    pub fn mcp_url(&self) -> Result<Url, ConfigurationError> {
        self.endpoint_url(&self.mcp_endpoint)
    }

    /// Full URL of the health endpoint, if one is configured
    pub fn health_url(&self) -> Result<Option<Url>, ConfigurationError> {
        match &self.health_endpoint {
            Some(endpoint) => self.endpoint_url(endpoint).map(Some),
            None => Ok(None),
        }
    }

    fn base_url(&self) -> Result<Url, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidUrl {
            server: self.name.clone(),
            url: self.url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        url.set_port(Some(self.port))
            .map_err(|_| invalid("url cannot carry a port".to_string()))?;
        Ok(url)
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ConfigurationError> {
        if !endpoint.starts_with('/') {
            return Err(ConfigurationError::InvalidEndpoint {
                server: self.name.clone(),
                endpoint: endpoint.to_string(),
            });
        }
        self.base_url()?
            .join(endpoint)
            .map_err(|e| ConfigurationError::InvalidUrl {
                server: self.name.clone(),
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }

    /// Check the config shape without touching the network.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_server_name(&self.name)?;
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::MissingField { field: "url" });
        }
        if self.port == 0 {
            return Err(ConfigurationError::InvalidPort {
                server: self.name.clone(),
                port: self.port,
            });
        }
        self.mcp_url()?;
        self.health_url()?;
        Ok(())
    }
}

/// Server names become tool namespaces, so they may not contain the
/// separator or whitespace.
pub fn validate_server_name(name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() {
        return Err(ConfigurationError::MissingField { field: "name" });
    }
    if name.contains(TOOL_NAME_SEPARATOR) {
        return Err(ConfigurationError::InvalidName {
            name: name.to_string(),
            reason: format!("must not contain '{}'", TOOL_NAME_SEPARATOR),
        });
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ConfigurationError::InvalidName {
            name: name.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }
    Ok(())
}

fn default_token_env() -> String {
    "AUTH_TOKEN".to_string()
}

/// Static registry entry for the authorization-gated server.
///
/// The address comes from configuration; credentials are assembled at
/// token-set time from the token itself plus the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedServerSpec {
    pub name: String,
    pub url: String,
    pub port: u16,
    #[serde(default)]
    pub health_endpoint: Option<String>,
    #[serde(default = "default_mcp_endpoint")]
    pub mcp_endpoint: String,
    /// Env key under which the token is handed to the server
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Process environment variables copied into the server's env
    #[serde(default)]
    pub env_passthrough: Vec<String>,
}

impl RestrictedServerSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            port,
            health_endpoint: None,
            mcp_endpoint: default_mcp_endpoint(),
            token_env: default_token_env(),
            env_passthrough: Vec::new(),
        }
    }

    pub fn with_env_passthrough(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env_passthrough = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Check the spec shape as if a token were set. The name is a tool
    /// namespace like any other server's.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.token_env.trim().is_empty() {
            return Err(ConfigurationError::MissingField { field: "token_env" });
        }
        self.build_config_with("token", |_| None).validate()
    }

    /// Build the server config for `token`, reading passthrough values from
    /// the process environment.
    pub fn build_config(&self, token: &str) -> ServerConfig {
        self.build_config_with(token, |key| std::env::var(key).ok())
    }

    /// Build the server config for `token` with an explicit env lookup.
    pub fn build_config_with<F>(&self, token: &str, lookup: F) -> ServerConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = HashMap::new();
        for key in &self.env_passthrough {
            match lookup(key) {
                Some(value) => {
                    env.insert(key.clone(), value);
                }
                None => {
                    tracing::debug!(server = %self.name, key = %key, "Passthrough env var not set");
                }
            }
        }
        env.insert(self.token_env.clone(), token.to_string());

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));

        ServerConfig {
            name: self.name.clone(),
            url: self.url.clone(),
            port: self.port,
            health_endpoint: self.health_endpoint.clone(),
            mcp_endpoint: self.mcp_endpoint.clone(),
            env,
            headers,
        }
    }
}
