//! Command-line arguments
//!
//! Every flag also reads a `PLANNER_*` environment variable. Anything left
//! unset falls back to the config file, then to built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::TransportMode;

#[derive(Debug, Default, Parser)]
#[command(name = "planner-mcp")]
#[command(version, about = "MCP server for the planner task API")]
pub struct Cli {
    /// TOML config file
    #[arg(long, env = "PLANNER_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// stdio (single-tenant) or http (multi-tenant)
    #[arg(long, env = "PLANNER_TRANSPORT", value_enum)]
    pub transport: Option<TransportMode>,

    /// Address the HTTP transport binds to
    #[arg(long, env = "PLANNER_HTTP_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "PLANNER_HTTP_PORT")]
    pub port: Option<u16>,

    /// Path the MCP endpoint is served under
    #[arg(long, env = "PLANNER_HTTP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Base URL of the planner API
    #[arg(long, env = "PLANNER_API_URL")]
    pub api_url: Option<String>,

    #[arg(long, env = "PLANNER_API_TIMEOUT_SECS")]
    pub api_timeout_secs: Option<u64>,

    /// Login email (stdio mode)
    #[arg(long, env = "PLANNER_EMAIL")]
    pub email: Option<String>,

    /// Login password (stdio mode)
    #[arg(long, env = "PLANNER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// API token, instead of email and password (stdio mode)
    #[arg(long, env = "PLANNER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "PLANNER_CLIENT_IDLE_TIMEOUT_SECS")]
    pub client_idle_timeout_secs: Option<u64>,

    #[arg(long, env = "PLANNER_CLIENT_MAX_LIFETIME_SECS")]
    pub client_max_lifetime_secs: Option<u64>,

    #[arg(long, env = "PLANNER_SESSION_IDLE_TIMEOUT_SECS")]
    pub session_idle_timeout_secs: Option<u64>,

    #[arg(long, env = "PLANNER_SESSION_MAX_LIFETIME_SECS")]
    pub session_max_lifetime_secs: Option<u64>,

    #[arg(long, env = "PLANNER_CLIENT_SWEEP_INTERVAL_SECS")]
    pub client_sweep_interval_secs: Option<u64>,

    #[arg(long, env = "PLANNER_SESSION_SWEEP_INTERVAL_SECS")]
    pub session_sweep_interval_secs: Option<u64>,
}
