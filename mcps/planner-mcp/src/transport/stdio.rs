//! Single-tenant MCP over stdin/stdout

use std::sync::Arc;

use rmcp::{transport::stdio, ServiceExt};

use crate::resolver::ClientResolver;
use crate::server::PlannerMcpServer;

/// Serve one MCP client until it disconnects or the process is signalled
pub async fn serve(resolver: Arc<ClientResolver>) -> anyhow::Result<()> {
    let server = PlannerMcpServer::new(resolver);
    let service = server.serve(stdio()).await?;

    tracing::info!("Planner MCP server running on stdio");

    tokio::select! {
        result = service.waiting() => {
            result?;
            tracing::info!("stdio client disconnected");
        }
        _ = mcp_common::shutdown_signal() => {}
    }

    Ok(())
}
