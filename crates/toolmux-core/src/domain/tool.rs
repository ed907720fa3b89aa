use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::server::TOOL_NAME_SEPARATOR;

/// A tool discovered on a connected server.
///
/// `name` is namespaced (`server:original`) and unique across the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub server_name: String,
    pub original_name: String,
}

impl Tool {
    pub fn new(
        server_name: impl Into<String>,
        original_name: impl Into<String>,
        description: Option<String>,
        input_schema: Value,
    ) -> Self {
        let server_name = server_name.into();
        let original_name = original_name.into();
        Self {
            name: format!("{}{}{}", server_name, TOOL_NAME_SEPARATOR, original_name),
            description,
            input_schema,
            server_name,
            original_name,
        }
    }
}
