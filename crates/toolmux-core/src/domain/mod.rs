//! Domain entities

mod result;
mod server;
mod status;
mod tool;

pub use result::{content_text, CallResult, ToolOutput};
pub use server::{validate_server_name, RestrictedServerSpec, ServerConfig, TOOL_NAME_SEPARATOR};
pub use status::ConnectionStatus;
pub use tool::Tool;
