//! Tool Invoker - executes a single tool call
//!
//! Resolve, check health, re-resolve, call under timeout. The connection is
//! always re-resolved after the health check because a repair swaps a new
//! connection into the map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use toolmux_core::{content_text, CallResult, ConnectionError, McpError, ToolError, ToolOutput};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::orchestrator::ConnectionOrchestrator;
use crate::registry::ToolRegistry;
use crate::router::ToolRouter;

pub struct ToolInvoker {
    router: Arc<ToolRouter>,
    registry: Arc<ToolRegistry>,
    orchestrator: Arc<ConnectionOrchestrator>,
    call_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(
        router: Arc<ToolRouter>,
        registry: Arc<ToolRegistry>,
        orchestrator: Arc<ConnectionOrchestrator>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            router,
            registry,
            orchestrator,
            call_timeout,
        }
    }

    /// Invoke a namespaced tool. Never errors; failures land in the result.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> CallResult<ToolOutput> {
        let start = Instant::now();
        match self.execute(name, arguments).await {
            Ok(output) => {
                let elapsed = start.elapsed();
                debug!(tool = %name, ?elapsed, "[ToolInvoker] Call succeeded");
                CallResult::ok(output, elapsed)
            }
            Err(e) => {
                let elapsed = start.elapsed();
                warn!(tool = %name, error = %e, ?elapsed, "[ToolInvoker] Call failed");
                CallResult::failed(e, elapsed)
            }
        }
    }

    async fn execute(&self, name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        if !self.router.validate_tool_name(name) {
            return Err(ToolError::InvalidName {
                name: name.to_string(),
            }
            .into());
        }

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            _ => {
                return Err(ToolError::InvalidArguments {
                    tool: name.to_string(),
                }
                .into())
            }
        };

        let connection = self.resolve(name)?;
        let server = connection.server_name().to_string();

        if !self.orchestrator.ensure_connection_health(&connection).await {
            return Err(ConnectionError::Unavailable {
                server,
                message: "health check and reconnection failed".to_string(),
            }
            .into());
        }

        // May be a different object if the health check reconnected.
        let connection = self.resolve(name)?;
        let parsed = self.router.parse_tool_name(name).ok_or_else(|| ToolError::InvalidName {
            name: name.to_string(),
        })?;

        info!(
            tool = %parsed.original_name,
            server = %server,
            timeout = ?self.call_timeout,
            "[ToolInvoker] Executing tool call"
        );

        let outcome = tokio::time::timeout(
            self.call_timeout,
            connection.session().call_tool(&parsed.original_name, arguments),
        )
        .await;

        let result = match outcome {
            Err(_) => {
                connection.mark_stale();
                return Err(ToolError::Timeout {
                    tool: name.to_string(),
                    timeout: self.call_timeout,
                }
                .into());
            }
            Ok(Err(e)) => {
                connection.mark_stale();
                return Err(ToolError::CallFailed {
                    tool: name.to_string(),
                    message: format!("{:#}", e),
                }
                .into());
            }
            Ok(Ok(result)) => result,
        };

        if result.is_error {
            let message = content_text(&result.content);
            return Err(ToolError::Execution {
                tool: name.to_string(),
                message: if message.is_empty() {
                    "tool returned an error without text content".to_string()
                } else {
                    message
                },
            }
            .into());
        }

        Ok(ToolOutput {
            content: result.content,
            structured_content: result.structured_content,
        })
    }

    fn resolve(&self, name: &str) -> Result<Arc<Connection>, ToolError> {
        self.registry
            .find_tool_connection(name)
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
            })
    }
}
