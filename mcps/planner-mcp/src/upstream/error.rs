//! Error types for planner API calls

use thiserror::Error;

/// Errors returned by the planner API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Credentials or token were rejected (HTTP 401/403)
    #[error("planner API rejected the credentials")]
    Unauthorized,

    /// Any other non-success status
    #[error("planner API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Login succeeded but the response carried no session token
    #[error("planner API login response did not include a token")]
    MissingToken,

    /// Transport-level failure
    #[error("planner API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Base URL could not be joined with an endpoint path
    #[error("invalid planner API URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for planner API operations
pub type ApiResult<T> = Result<T, ApiError>;
