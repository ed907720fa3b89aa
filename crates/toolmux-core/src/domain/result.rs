//! Call results
//!
//! Tool invocations never raise to the caller; success and failure are both
//! represented by a `CallResult`, which always carries the wall-clock
//! execution time so callers can flag slow tools.

use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::McpError;

/// Payload of a successful tool call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolOutput {
    /// MCP content blocks, as JSON
    pub content: Vec<Value>,
    pub structured_content: Option<Value>,
}

impl ToolOutput {
    /// Concatenated text of all `text` content blocks.
    pub fn text(&self) -> String {
        content_text(&self.content)
    }
}

/// Join the `text` fields of MCP content blocks with newlines.
pub fn content_text(content: &[Value]) -> String {
    content
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of a single tool invocation
#[derive(Debug, Clone, Serialize)]
pub struct CallResult<T = ToolOutput> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<McpError>,
    #[serde(rename = "execution_time_ms", serialize_with = "serialize_millis")]
    pub execution_time: Duration,
}

impl<T> CallResult<T> {
    pub fn ok(data: T, execution_time: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time,
        }
    }

    pub fn failed(error: impl Into<McpError>, execution_time: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time,
        }
    }

    /// Error message, if the call failed
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

fn serialize_error<S: Serializer>(error: &Option<McpError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
