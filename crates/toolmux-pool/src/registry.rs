//! Tool Registry - read view over the live connection map

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use toolmux_core::Tool;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::orchestrator::ConnectionMap;
use crate::router::ToolRouter;

/// Aggregates tools and resolves tool names against whichever map was last
/// registered.
///
/// Holds a handle, not a copy: repairs made by the orchestrator show up here
/// without re-registration.
pub struct ToolRegistry {
    router: Arc<ToolRouter>,
    connections: RwLock<ConnectionMap>,
}

impl ToolRegistry {
    pub fn new(router: Arc<ToolRouter>) -> Self {
        Self {
            router,
            connections: RwLock::new(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    pub fn register_connections(&self, connections: ConnectionMap) {
        let count = connections.read().len();
        *self.connections.write() = connections;
        debug!("[ToolRegistry] Registered {} connection(s)", count);
    }

    /// Every tool from every connected server, keyed by namespaced name.
    pub fn get_all_tools(&self) -> BTreeMap<String, Tool> {
        let map = self.current();
        let connections = map.read();

        let mut tools = BTreeMap::new();
        for conn in connections.values().filter(|c| c.is_connected()) {
            for tool in conn.tools() {
                if tools.contains_key(&tool.name) {
                    warn!(tool = %tool.name, "[ToolRegistry] Duplicate tool name; keeping first");
                    continue;
                }
                tools.insert(tool.name.clone(), tool.clone());
            }
        }
        tools
    }

    /// The connection currently serving `name`
    pub fn find_tool_connection(&self, name: &str) -> Option<Arc<Connection>> {
        let map = self.current();
        let connections = map.read();
        self.router.find_tool(name, &connections)
    }

    pub fn clear(&self) {
        self.register_connections(Arc::new(RwLock::new(HashMap::new())));
    }

    fn current(&self) -> ConnectionMap {
        Arc::clone(&self.connections.read())
    }
}
