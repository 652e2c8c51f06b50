//! Planner MCP Library
//!
//! MCP server for the planner task API with two delivery modes:
//!
//! - **stdio**: single-tenant. One credential from the environment, one
//!   lazily authenticated client for the whole process.
//! - **http**: multi-tenant streamable HTTP. Every new session authenticates
//!   with its own `Authorization` header; clients are cached per credential
//!   and sessions expire on idle and lifetime limits.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use planner_mcp::{ClientResolver, PlannerMcpServer};
//!
//! let resolver = Arc::new(ClientResolver::single_tenant(connector, credential));
//! let server = PlannerMcpServer::new(resolver);
//! ```

pub mod cli;
pub mod client_cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod params;
pub mod reaper;
pub mod resolver;
pub mod server;
pub mod sessions;
pub mod transport;
pub mod ttl;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use client_cache::{AuthenticatedClient, ClientCache};
pub use config::{Config, ConfigError, TransportMode};
pub use credentials::{parse_authorization, CacheKey, Credential, CredentialError};
pub use error::AuthError;
pub use reaper::Reaper;
pub use resolver::{ClientResolver, RequestContext};
pub use server::PlannerMcpServer;
pub use sessions::{SessionManager, SessionTransport};
pub use ttl::TtlPolicy;
