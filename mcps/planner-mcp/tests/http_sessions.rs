//! End-to-end tests for the multi-tenant HTTP transport
//!
//! Runs the real router on 127.0.0.1:0 against an in-memory planner API and
//! drives it with reqwest.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use planner_mcp::transport::http::router;
use planner_mcp::upstream::{ApiClient, ApiConnector, ApiError, ApiResult};
use planner_mcp::{ClientResolver, TtlPolicy};
use rmcp::transport::streamable_http_server::session::{
    local::LocalSessionManager, SessionManager as _,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const ENDPOINT: &str = "/mcp";
const ACCEPT: &str = "application/json, text/event-stream";

#[derive(Default)]
struct Planner {
    logins: AtomicUsize,
}

#[async_trait]
impl ApiConnector for Planner {
    async fn login(&self, identity: &str, secret: &str) -> ApiResult<Arc<dyn ApiClient>> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if secret != "correct horse" {
            return Err(ApiError::Unauthorized);
        }
        Ok(Arc::new(User(identity.to_string())))
    }

    async fn with_token(&self, token: &str) -> ApiResult<Arc<dyn ApiClient>> {
        Ok(Arc::new(User(format!("token:{token}"))))
    }
}

struct User(String);

#[async_trait]
impl ApiClient for User {
    async fn call(&self, method: &str, _args: Value) -> ApiResult<Value> {
        Ok(json!({ "method": method, "email": self.0 }))
    }

    async fn logout(&self) -> ApiResult<()> {
        Ok(())
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    resolver: Arc<ClientResolver>,
    rmcp_sessions: Arc<LocalSessionManager>,
    planner: Arc<Planner>,
    shutdown: CancellationToken,
}

fn long_policy() -> TtlPolicy {
    TtlPolicy::new(Duration::from_secs(3600), Duration::from_secs(86_400))
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(long_policy()).await
    }

    async fn start_with(session_policy: TtlPolicy) -> Self {
        let planner = Arc::new(Planner::default());
        let resolver = Arc::new(ClientResolver::multi_tenant(
            planner.clone(),
            long_policy(),
            session_policy,
        ));
        let rmcp_sessions = Arc::new(LocalSessionManager::default());
        let shutdown = CancellationToken::new();
        let app = router(
            resolver.clone(),
            rmcp_sessions.clone(),
            ENDPOINT,
            shutdown.clone(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let graceful = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { graceful.cancelled_owned().await })
                .await;
        });

        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            resolver,
            rmcp_sessions,
            planner,
            shutdown,
        }
    }

    async fn tools_list(&self, session_id: &str) -> reqwest::Response {
        self.post(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
            .header("mcp-session-id", session_id)
            .send()
            .await
            .unwrap()
    }

    async fn rmcp_has_session(&self, session_id: &str) -> bool {
        let id: Arc<str> = Arc::from(session_id);
        self.rmcp_sessions.has_session(&id).await.unwrap()
    }

    fn post(&self, body: Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{ENDPOINT}", self.base))
            .header("accept", ACCEPT)
            .json(&body)
    }

    async fn initialize(&self, authorization: Option<&str>) -> reqwest::Response {
        let mut request = self.post(initialize_request());
        if let Some(value) = authorization {
            request = request.header("authorization", value);
        }
        request.send().await.unwrap()
    }

    async fn open_session(&self) -> String {
        let response = self.initialize(Some(&basic("me@example.com", "correct horse"))).await;
        assert_eq!(response.status(), 200);
        response
            .headers()
            .get("mcp-session-id")
            .expect("session id header")
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn health(&self) -> Value {
        self.http
            .get(format!("{}/health", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn basic(identity: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{identity}:{secret}")))
}

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "planner-test", "version": "0.0.0" }
        }
    })
}

/// Pull the JSON-RPC message carrying `id` out of an SSE body
fn sse_message(body: &str, id: u64) -> Option<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|msg| msg["id"] == json!(id))
}

#[tokio::test]
async fn test_initialize_without_credentials_is_unauthorized() {
    let server = TestServer::start().await;

    let response = server.initialize(None).await;

    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(server.resolver.sessions().unwrap().len(), 0);
}

#[tokio::test]
async fn test_malformed_and_rejected_credentials_are_unauthorized() {
    let server = TestServer::start().await;

    let malformed = server.initialize(Some("Basic !!!not-base64")).await;
    assert_eq!(malformed.status(), 401);

    let unsupported = server.initialize(Some("Digest abc")).await;
    assert_eq!(unsupported.status(), 401);

    let wrong = server.initialize(Some(&basic("me@example.com", "wrong"))).await;
    assert_eq!(wrong.status(), 401);
    assert!(wrong.headers().get("mcp-session-id").is_none());

    assert_eq!(server.planner.logins.load(Ordering::SeqCst), 1);
    assert!(server.resolver.client_cache().unwrap().is_empty());
}

#[tokio::test]
async fn test_initialize_with_credentials_registers_session() {
    let server = TestServer::start().await;

    let session_id = server.open_session().await;

    assert!(server.resolver.has_session(&session_id));
    let health = server.health().await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["clients"], 1);
}

#[tokio::test]
async fn test_same_credentials_share_one_login() {
    let server = TestServer::start().await;

    let first = server.open_session().await;
    let second = server.open_session().await;

    assert_ne!(first, second);
    assert_eq!(server.planner.logins.load(Ordering::SeqCst), 1);
    let health = server.health().await;
    assert_eq!(health["sessions"], 2);
    assert_eq!(health["clients"], 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let server = TestServer::start().await;

    let response = server
        .post(json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .header("mcp-session-id", "no-such-session")
        .header("authorization", basic("me@example.com", "correct horse"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32002);
    assert_eq!(server.planner.logins.load(Ordering::SeqCst), 0);
}

async fn assert_session_not_found(response: reqwest::Response) {
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32002);
}

#[tokio::test]
async fn test_expired_session_is_not_found_and_closed_in_rmcp() {
    let server = TestServer::start_with(TtlPolicy::new(
        Duration::from_millis(300),
        Duration::from_secs(3600),
    ))
    .await;
    let session_id = server.open_session().await;
    assert!(server.rmcp_has_session(&session_id).await);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_session_not_found(server.tools_list(&session_id).await).await;

    assert!(!server.resolver.has_session(&session_id));
    assert!(!server.rmcp_has_session(&session_id).await);
    // Only the session expired; its client is still cached.
    assert_eq!(server.resolver.client_cache().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_closes_expired_session_in_rmcp() {
    let server = TestServer::start_with(TtlPolicy::new(
        Duration::from_millis(300),
        Duration::from_secs(3600),
    ))
    .await;
    let session_id = server.open_session().await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.resolver.cleanup_expired().await, (0, 1));

    assert!(!server.resolver.has_session(&session_id));
    assert!(!server.rmcp_has_session(&session_id).await);
    assert_eq!(server.health().await["sessions"], 0);
}

#[tokio::test]
async fn test_session_lost_by_rmcp_is_dropped() {
    let server = TestServer::start().await;
    let session_id = server.open_session().await;

    let id: Arc<str> = Arc::from(session_id.as_str());
    server.rmcp_sessions.close_session(&id).await.unwrap();
    assert!(server.resolver.has_session(&session_id));

    assert_session_not_found(server.tools_list(&session_id).await).await;
    assert!(!server.resolver.has_session(&session_id));

    assert_session_not_found(server.tools_list(&session_id).await).await;
}

#[tokio::test]
async fn test_delete_ends_session() {
    let server = TestServer::start().await;
    let session_id = server.open_session().await;

    let response = server
        .http
        .delete(format!("{}{ENDPOINT}", server.base))
        .header("mcp-session-id", &session_id)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success(), "{}", response.status());
    assert!(!server.resolver.has_session(&session_id));

    assert_session_not_found(server.tools_list(&session_id).await).await;
}

#[tokio::test]
async fn test_tool_call_runs_as_session_user() {
    let server = TestServer::start().await;
    let session_id = server.open_session().await;

    let initialized = server
        .post(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .header("mcp-session-id", &session_id)
        .send()
        .await
        .unwrap();
    assert!(initialized.status().is_success());

    let response = server
        .post(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "get_user", "arguments": {} }
        }))
        .header("mcp-session-id", &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    let message = sse_message(&body, 3).expect("tools/call response");
    let text = message["result"]["content"][0]["text"].as_str().unwrap();
    let user: Value = serde_json::from_str(text).unwrap();
    assert_eq!(user["method"], "getUser");
    assert_eq!(user["email"], "me@example.com");
}

#[tokio::test]
async fn test_health_is_not_gated() {
    let server = TestServer::start().await;

    let health = server.health().await;

    assert_eq!(health["sessions"], 0);
    assert_eq!(health["clients"], 0);
}
