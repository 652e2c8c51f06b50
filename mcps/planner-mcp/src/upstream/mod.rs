//! Planner API client
//!
//! The server treats the planner API as an external collaborator: it only
//! needs to log in, call named methods with a JSON argument object, and log
//! out. [`ApiConnector`] and [`ApiClient`] are that seam; [`HttpApiConnector`]
//! is the production implementation.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiConnector, HttpApiClient, HttpApiConnector};
pub use error::{ApiError, ApiResult};
