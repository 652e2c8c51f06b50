//! Authentication and session errors surfaced at the transport boundary

use axum::http::StatusCode;
use mcp_common::{internal_error, session_not_found, unauthorized, IntoMcpError, McpError};
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::upstream::ApiError;

/// Why a request could not be bound to an authenticated planner client
///
/// `Clone` because a single in-flight login is awaited by every request that
/// arrived for the same credential, and each of them receives the outcome.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The `Authorization` header was malformed
    #[error("invalid credentials: {0}")]
    Format(#[from] CredentialError),

    /// The planner API rejected the credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The planner API could not be reached or failed while logging in
    #[error("planner API unavailable: {0}")]
    Upstream(String),

    /// The session id is unknown or its session expired
    #[error("session not found or expired: {0}")]
    SessionNotFound(String),

    /// Neither a session id nor credentials were supplied
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Format(_) | Self::Authentication(_) | Self::NotAuthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::Unauthorized | ApiError::MissingToken => Self::Authentication(err.to_string()),
            ApiError::Status { status, .. } if status.is_client_error() => {
                Self::Authentication(err.to_string())
            }
            ApiError::Status { .. } | ApiError::Http(_) | ApiError::Url(_) => {
                Self::Upstream(err.to_string())
            }
        }
    }
}

impl IntoMcpError for AuthError {
    fn into_mcp_error(self) -> McpError {
        match self {
            Self::SessionNotFound(_) => session_not_found(self.to_string()),
            Self::Upstream(_) => internal_error(self.to_string()),
            _ => unauthorized(self.to_string()),
        }
    }
}

impl From<AuthError> for McpError {
    fn from(err: AuthError) -> Self {
        err.into_mcp_error()
    }
}
