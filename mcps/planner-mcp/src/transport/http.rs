//! Multi-tenant MCP over streamable HTTP
//!
//! rmcp's [`StreamableHttpService`] owns the protocol and its own session
//! table. A middleware in front of it binds each rmcp session to the planner
//! client that opened it and enforces expiry:
//!
//! - `POST` without `Mcp-Session-Id` must carry `Authorization`. The
//!   credential is resolved before the request is forwarded, and the session
//!   id rmcp assigns in its response is registered against that client.
//! - Any request naming an unknown or expired session gets a 404 with a
//!   JSON-RPC error, and whatever rmcp still holds for it is closed. A
//!   session rmcp has lost on its own is dropped and answered the same way.
//! - `DELETE` is forwarded, then the session is forgotten.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mcp_common::{jsonrpc_error_body, McpError};
use rmcp::transport::streamable_http_server::{
    session::{local::LocalSessionManager, SessionManager as _},
    StreamableHttpServerConfig, StreamableHttpService,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::AuthError;
use crate::resolver::{ClientResolver, RequestContext, MCP_SESSION_ID};
use crate::server::PlannerMcpServer;
use crate::sessions::SessionTransport;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Handle to a session inside rmcp's session table
struct RmcpSession {
    manager: Arc<LocalSessionManager>,
    id: Arc<str>,
}

#[async_trait]
impl SessionTransport for RmcpSession {
    async fn close(&self) -> anyhow::Result<()> {
        self.manager
            .close_session(&self.id)
            .await
            .map_err(|e| anyhow::anyhow!("closing rmcp session {}: {e}", self.id))
    }
}

#[derive(Clone)]
struct GateState {
    resolver: Arc<ClientResolver>,
    rmcp_sessions: Arc<LocalSessionManager>,
}

/// Build the HTTP application: the MCP endpoint behind the session gate,
/// plus an ungated `GET /health`.
///
/// `rmcp_sessions` is rmcp's own session table; expired sessions are closed
/// in it. Cancelling `shutdown` closes every rmcp session so open event
/// streams end.
pub fn router(
    resolver: Arc<ClientResolver>,
    rmcp_sessions: Arc<LocalSessionManager>,
    endpoint: &str,
    shutdown: CancellationToken,
) -> Router {
    let factory_resolver = resolver.clone();
    let mcp: StreamableHttpService<PlannerMcpServer, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(PlannerMcpServer::new(factory_resolver.clone())),
            rmcp_sessions.clone(),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(SSE_KEEP_ALIVE),
                cancellation_token: shutdown.child_token(),
                ..Default::default()
            },
        );

    let state = GateState {
        resolver,
        rmcp_sessions,
    };

    let gated = Router::new()
        .route_service(endpoint, mcp)
        .layer(middleware::from_fn_with_state(state.clone(), gate));

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(gated)
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve(resolver: Arc<ClientResolver>, config: &HttpConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let rmcp_sessions = Arc::new(LocalSessionManager::default());
    let app = router(resolver, rmcp_sessions, &config.endpoint, shutdown.clone());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    info!(
        addr = %listener.local_addr()?,
        endpoint = %config.endpoint,
        "Planner MCP server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            mcp_common::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn gate(State(state): State<GateState>, request: Request, next: Next) -> Response {
    let session_id = request
        .headers()
        .get(MCP_SESSION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match session_id {
        None => open_session(&state, request, next).await,
        Some(id) => within_session(&state, id, request, next).await,
    }
}

async fn open_session(state: &GateState, request: Request, next: Next) -> Response {
    // rmcp itself rejects GET and DELETE without a session id.
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let client = match state.resolver.authenticate(authorization.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            info!(error = %e, "rejected new session");
            return error_response(e);
        }
    };

    let response = next.run(request).await;

    let new_id = response
        .headers()
        .get(MCP_SESSION_ID)
        .and_then(|v| v.to_str().ok());
    if let Some(id) = new_id {
        let transport = Arc::new(RmcpSession {
            manager: state.rmcp_sessions.clone(),
            id: Arc::from(id),
        });
        state.resolver.create_session(id, transport, client);
    }
    response
}

async fn within_session(state: &GateState, id: String, request: Request, next: Next) -> Response {
    let ctx = RequestContext {
        session_id: Some(id.clone()),
        authorization: None,
    };
    if let Err(e) = state.resolver.resolve(&ctx).await {
        close_residue(&state.rmcp_sessions, &id).await;
        return error_response(e);
    }

    let is_delete = request.method() == Method::DELETE;
    let response = next.run(request).await;

    if is_delete {
        state.resolver.remove_session(&id);
        return response;
    }

    // The session was live here, so a rejection from rmcp means rmcp lost it.
    let lost = matches!(
        response.status(),
        StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED
    );
    if lost && state.resolver.remove_session(&id) {
        warn!(session_id = %id, "rmcp no longer knows session, dropped it");
        return error_response(AuthError::SessionNotFound(id));
    }
    response
}

async fn close_residue(manager: &LocalSessionManager, id: &str) {
    let id: Arc<str> = Arc::from(id);
    if let Ok(true) = manager.has_session(&id).await {
        match manager.close_session(&id).await {
            Ok(()) => debug!(session_id = %id, "closed stale rmcp session"),
            Err(e) => debug!(session_id = %id, error = %e, "stale rmcp session already gone"),
        }
    }
}

fn error_response(err: AuthError) -> Response {
    let status = err.status_code();
    let mcp = McpError::from(err);
    (status, Json(jsonrpc_error_body(mcp.code, &mcp.message))).into_response()
}

async fn health(State(state): State<GateState>) -> Json<serde_json::Value> {
    let sessions = state.resolver.sessions().map_or(0, |s| s.len());
    let clients = state.resolver.client_cache().map_or(0, |c| c.len());
    Json(json!({
        "status": "ok",
        "sessions": sessions,
        "clients": clients,
    }))
}
