//! MCP Common - shared utilities for MCP servers
//!
//! - **Initialization**: tracing setup and the shutdown signal future
//! - **Results**: JSON `CallToolResult` builder
//! - **Errors**: conversion trait and application error codes

pub mod error;
pub mod init;
pub mod result;

pub use error::{
    internal_error, invalid_params, jsonrpc_error_body, session_not_found, unauthorized,
    IntoMcpError, SESSION_NOT_FOUND, UNAUTHORIZED,
};
pub use init::{init_tracing, shutdown_signal};
pub use result::json_success;

pub use rmcp::{model::CallToolResult, ErrorData as McpError};
