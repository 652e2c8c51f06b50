//! Planner MCP Server
//!
//! Exposes the planner task API as MCP tools.
//!
//! # Configuration
//! Set `PLANNER_API_URL` and either run over stdio with `PLANNER_EMAIL` +
//! `PLANNER_PASSWORD` (or `PLANNER_TOKEN`), or pass `--transport http` to
//! serve many users, each authenticating per session. See `--help`.

use std::sync::Arc;

use clap::Parser;
use planner_mcp::cli::Cli;
use planner_mcp::config::{Config, TransportMode};
use planner_mcp::transport::{http, stdio};
use planner_mcp::upstream::HttpApiConnector;
use planner_mcp::{ClientResolver, Reaper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_common::init_tracing("planner_mcp")?;

    let cli = Cli::parse();
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            return Err(e.into());
        }
    };

    tracing::info!(
        transport = ?config.transport,
        api = %config.api.base_url,
        "Starting Planner MCP server"
    );

    let connector = Arc::new(HttpApiConnector::new(
        config.api.base_url.clone(),
        config.api.timeout,
    )?);

    let resolver = Arc::new(match (config.transport, config.credential.clone()) {
        (TransportMode::Stdio, Some(credential)) => {
            ClientResolver::single_tenant(connector, credential)
        }
        (TransportMode::Stdio, None) => {
            anyhow::bail!("stdio mode requires credentials")
        }
        (TransportMode::Http, _) => ClientResolver::multi_tenant(
            connector,
            config.ttl.client_policy(),
            config.ttl.session_policy(),
        ),
    });

    let reaper = Reaper::start(
        resolver.clone(),
        config.ttl.client_sweep_interval,
        config.ttl.session_sweep_interval,
    );

    let result = match config.transport {
        TransportMode::Stdio => stdio::serve(resolver).await,
        TransportMode::Http => http::serve(resolver, &config.http).await,
    };

    reaper.shutdown().await;
    tracing::info!("Planner MCP server stopped");

    result
}
