//! Error helpers for MCP servers
//!
//! A conversion trait for per-crate error enums, plus the application-level
//! JSON-RPC codes used when a request is rejected for authentication or
//! session reasons.

use rmcp::model::ErrorCode;
use rmcp::ErrorData as McpError;

/// Caller is not authenticated or its credentials were rejected
pub const UNAUTHORIZED: ErrorCode = ErrorCode(-32001);

/// Session id is unknown or the session expired
pub const SESSION_NOT_FOUND: ErrorCode = ErrorCode(-32002);

/// Trait for converting errors into MCP-compatible errors
///
/// ```rust,ignore
/// impl IntoMcpError for MyError {
///     fn into_mcp_error(self) -> McpError {
///         McpError::internal_error(self.to_string(), None)
///     }
/// }
/// ```
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

/// Error for requests that carry no usable credentials
pub fn unauthorized(message: impl Into<String>) -> McpError {
    McpError::new(UNAUTHORIZED, message.into(), None)
}

/// Error for requests that reference a session the server no longer holds
pub fn session_not_found(message: impl Into<String>) -> McpError {
    McpError::new(SESSION_NOT_FOUND, message.into(), None)
}

/// JSON-RPC error envelope for rejections that happen before a request
/// reaches the MCP service (no request id is known at that point)
pub fn jsonrpc_error_body(code: ErrorCode, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code.0,
            "message": message,
        },
        "id": null,
    })
}
