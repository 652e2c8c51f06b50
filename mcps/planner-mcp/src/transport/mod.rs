//! Delivery modes
//!
//! - [`stdio`]: one client over stdin/stdout, single-tenant
//! - [`http`]: streamable HTTP with per-request credentials, multi-tenant

pub mod http;
pub mod stdio;
