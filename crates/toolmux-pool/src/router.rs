//! Tool Router - namespaced tool names and connection lookup
//!
//! Tool names are `"<server>:<tool>"`. Server names may not contain the
//! separator, so parsing splits at the first `:` and the tool half may
//! itself contain colons.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use toolmux_core::TOOL_NAME_SEPARATOR;
use tracing::trace;

use crate::connection::Connection;

/// Parse-cache entries beyond this are dropped wholesale
const MAX_CACHE_ENTRIES: usize = 1024;

/// A namespaced tool name split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedToolName {
    pub server_name: String,
    pub original_name: String,
}

/// Formats, parses and resolves namespaced tool names.
///
/// The only state is a memo of successful parses, which the owner clears
/// on teardown.
#[derive(Default)]
pub struct ToolRouter {
    cache: DashMap<String, ParsedToolName>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_tool_name(server_name: &str, original_name: &str) -> String {
        format!("{}{}{}", server_name, TOOL_NAME_SEPARATOR, original_name)
    }

    /// Split a namespaced name; `None` if it is not of the form `server:tool`.
    pub fn parse_tool_name(&self, name: &str) -> Option<ParsedToolName> {
        if let Some(hit) = self.cache.get(name) {
            return Some(hit.clone());
        }

        let (server, tool) = name.split_once(TOOL_NAME_SEPARATOR)?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        let parsed = ParsedToolName {
            server_name: server.to_string(),
            original_name: tool.to_string(),
        };

        if self.cache.len() >= MAX_CACHE_ENTRIES {
            trace!("[ToolRouter] Parse cache full, clearing");
            self.cache.clear();
        }
        self.cache.insert(name.to_string(), parsed.clone());
        Some(parsed)
    }

    /// Format check only; no connection lookup.
    pub fn validate_tool_name(&self, name: &str) -> bool {
        Self::is_routable_name(name) && self.parse_tool_name(name).is_some()
    }

    /// Character rule shared by namespaced names and the server-local
    /// names discovery accepts: non-empty, no whitespace or control chars.
    pub fn is_routable_name(name: &str) -> bool {
        !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
    }

    /// Connection currently serving `name`, if that connection lists the tool.
    pub fn find_tool(
        &self,
        name: &str,
        connections: &HashMap<String, Arc<Connection>>,
    ) -> Option<Arc<Connection>> {
        let parsed = self.parse_tool_name(name)?;
        connections
            .get(&parsed.server_name)
            .filter(|conn| conn.has_tool(&parsed.original_name))
            .cloned()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
