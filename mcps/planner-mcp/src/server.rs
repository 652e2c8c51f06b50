//! MCP Server implementation for the planner API
//!
//! Every tool first resolves the planner client for the calling request,
//! then delegates to its handler. Over HTTP the request headers reach the
//! tool through the request context; over stdio there are none and the
//! resolver falls back to the process-wide client.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer,
};

use crate::client_cache::AuthenticatedClient;
use crate::handlers;
use crate::params::*;
use crate::resolver::{ClientResolver, RequestContext as ClientContext};

/// The main Planner MCP Server
#[derive(Clone)]
pub struct PlannerMcpServer {
    resolver: Arc<ClientResolver>,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool resolves its client, then delegates to its handler
// ============================================================================

#[tool_router]
impl PlannerMcpServer {
    pub fn new(resolver: Arc<ClientResolver>) -> Self {
        Self {
            resolver,
            tool_router: Self::tool_router(),
        }
    }

    async fn client(
        &self,
        context: &RequestContext<RoleServer>,
    ) -> Result<Arc<AuthenticatedClient>, McpError> {
        let ctx = context
            .extensions
            .get::<http::request::Parts>()
            .map(|parts| ClientContext::from_headers(&parts.headers))
            .unwrap_or_default();
        self.resolver.resolve(&ctx).await.map_err(|e| {
            tracing::debug!(error = %e, "could not resolve planner client");
            McpError::from(e)
        })
    }

    // ========================================================================
    // User & streams
    // ========================================================================

    #[tool(description = "Get the authenticated user's profile, timezone and groups")]
    async fn get_user(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_user(&client).await
    }

    #[tool(description = "List streams (projects/channels) available to the user")]
    async fn get_streams(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_streams(&client).await
    }

    // ========================================================================
    // Task queries
    // ========================================================================

    #[tool(description = "Tasks scheduled for a day (YYYY-MM-DD), optionally filtered by completion")]
    async fn get_tasks_by_day(
        &self,
        Parameters(params): Parameters<GetTasksByDayParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_tasks_by_day(&client, params).await
    }

    #[tool(description = "Unscheduled tasks in the backlog")]
    async fn get_tasks_backlog(
        &self,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_tasks_backlog(&client).await
    }

    #[tool(description = "Archived tasks, paginated with offset and limit (1-1000)")]
    async fn get_archived_tasks(
        &self,
        Parameters(params): Parameters<GetArchivedTasksParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_archived_tasks(&client, params).await
    }

    #[tool(description = "Fetch a single task by ID")]
    async fn get_task_by_id(
        &self,
        Parameters(params): Parameters<GetTaskByIdParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::get_task_by_id(&client, params).await
    }

    // ========================================================================
    // Task mutations
    // ========================================================================

    #[tool(description = "Create a task, optionally scheduled for a day and filed under streams")]
    async fn create_task(
        &self,
        Parameters(params): Parameters<CreateTaskParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::create_task(&client, params).await
    }

    #[tool(description = "Mark a task complete or incomplete")]
    async fn update_task_complete(
        &self,
        Parameters(params): Parameters<UpdateTaskCompleteParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::update_task_complete(&client, params).await
    }

    #[tool(description = "Reschedule a task to another day, or back to the backlog")]
    async fn update_task_snooze_date(
        &self,
        Parameters(params): Parameters<UpdateTaskSnoozeDateParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::update_task_snooze_date(&client, params).await
    }

    #[tool(description = "Delete a task")]
    async fn delete_task(
        &self,
        Parameters(params): Parameters<DeleteTaskParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let client = self.client(&context).await?;
        handlers::delete_task(&client, params).await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for PlannerMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Planner task management: read the user's streams and daily tasks, \
                 browse the backlog and archive, create, complete, reschedule and delete tasks. \
                 Over HTTP, authenticate with an Authorization header (Basic or Bearer) \
                 on the initialize request."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
