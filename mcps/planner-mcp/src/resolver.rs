//! Maps an incoming request to the planner client it should run against
//!
//! In single-tenant mode there is one process-wide credential and one client,
//! logged in lazily on first use. In multi-tenant mode every request either
//! names a session (`Mcp-Session-Id`) or carries its own `Authorization`
//! header.

use std::fmt;
use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::client_cache::{authenticate, AuthenticatedClient, ClientCache};
use crate::credentials::{parse_authorization, Credential};
use crate::error::AuthError;
use crate::sessions::{SessionManager, SessionTransport};
use crate::ttl::{Release, TtlPolicy};
use crate::upstream::ApiConnector;

/// Header carrying the server-issued session id
pub const MCP_SESSION_ID: &str = "mcp-session-id";

/// What the transport knows about a request
#[derive(Clone, Default)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub authorization: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            session_id: header(MCP_SESSION_ID),
            authorization: header(AUTHORIZATION.as_str()),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("session_id", &self.session_id)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

struct SingleTenant {
    connector: Arc<dyn ApiConnector>,
    credential: Credential,
    client: OnceCell<Arc<AuthenticatedClient>>,
}

struct MultiTenant {
    cache: ClientCache,
    sessions: SessionManager,
}

enum Tenancy {
    Single(SingleTenant),
    Multi(MultiTenant),
}

/// Process-scoped resolver handed to every tool invocation
pub struct ClientResolver {
    tenancy: Tenancy,
}

impl ClientResolver {
    pub fn single_tenant(connector: Arc<dyn ApiConnector>, credential: Credential) -> Self {
        Self {
            tenancy: Tenancy::Single(SingleTenant {
                connector,
                credential,
                client: OnceCell::new(),
            }),
        }
    }

    pub fn multi_tenant(
        connector: Arc<dyn ApiConnector>,
        client_policy: TtlPolicy,
        session_policy: TtlPolicy,
    ) -> Self {
        Self {
            tenancy: Tenancy::Multi(MultiTenant {
                cache: ClientCache::new(connector, client_policy),
                sessions: SessionManager::new(session_policy),
            }),
        }
    }

    pub fn is_multi_tenant(&self) -> bool {
        matches!(self.tenancy, Tenancy::Multi(_))
    }

    pub fn client_cache(&self) -> Option<&ClientCache> {
        match &self.tenancy {
            Tenancy::Multi(multi) => Some(&multi.cache),
            Tenancy::Single(_) => None,
        }
    }

    pub fn sessions(&self) -> Option<&SessionManager> {
        match &self.tenancy {
            Tenancy::Multi(multi) => Some(&multi.sessions),
            Tenancy::Single(_) => None,
        }
    }

    /// Resolve the client a request should use
    ///
    /// Single-tenant: `ctx` is ignored and the global client is returned,
    /// logging in first if nobody has yet. Concurrent first calls share one
    /// login.
    ///
    /// Multi-tenant: a session id wins over credentials. An unknown or
    /// expired session is [`AuthError::SessionNotFound`]; a request with
    /// neither is [`AuthError::NotAuthenticated`].
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<Arc<AuthenticatedClient>, AuthError> {
        match &self.tenancy {
            Tenancy::Single(single) => single.client().await,
            Tenancy::Multi(multi) => {
                if let Some(session_id) = &ctx.session_id {
                    return multi.session_client(session_id).await;
                }
                match ctx.authorization.as_deref() {
                    Some(header) => multi.authenticate(header).await,
                    None => Err(AuthError::NotAuthenticated(
                        "request has neither a session id nor an Authorization header".into(),
                    )),
                }
            }
        }
    }

    /// Authenticate the `Authorization` header of a request opening a new
    /// session. In single-tenant mode the header is ignored.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<Arc<AuthenticatedClient>, AuthError> {
        match &self.tenancy {
            Tenancy::Single(single) => single.client().await,
            Tenancy::Multi(multi) => match authorization {
                Some(header) => multi.authenticate(header).await,
                None => Err(AuthError::NotAuthenticated(
                    "missing Authorization header".into(),
                )),
            },
        }
    }

    /// Bind a freshly established transport to the client it authenticated as
    pub fn create_session(
        &self,
        session_id: &str,
        transport: Arc<dyn SessionTransport>,
        client: Arc<AuthenticatedClient>,
    ) {
        match &self.tenancy {
            Tenancy::Multi(multi) => multi.sessions.create(session_id, transport, client),
            Tenancy::Single(_) => warn!(session_id, "ignoring session in single-tenant mode"),
        }
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        self.sessions()
            .is_some_and(|sessions| sessions.remove(session_id))
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions().is_some_and(|sessions| sessions.has(session_id))
    }

    /// Sweep both expiring registries once. Returns (clients, sessions) evicted.
    pub async fn cleanup_expired(&self) -> (usize, usize) {
        match &self.tenancy {
            Tenancy::Multi(multi) => (
                multi.cache.sweep_expired().await,
                multi.sessions.sweep_expired().await,
            ),
            Tenancy::Single(_) => (0, 0),
        }
    }

    /// Close every session and log out every client
    pub async fn cleanup_all(&self) {
        match &self.tenancy {
            Tenancy::Multi(multi) => {
                multi.sessions.drain_all().await;
                multi.cache.drain_all().await;
            }
            Tenancy::Single(single) => {
                if let Some(client) = single.client.get() {
                    match client.release().await {
                        Ok(()) => info!("logged out global client"),
                        Err(e) => warn!(error = %e, "logout of global client failed"),
                    }
                }
            }
        }
    }
}

impl SingleTenant {
    async fn client(&self) -> Result<Arc<AuthenticatedClient>, AuthError> {
        self.client
            .get_or_try_init(|| async {
                info!(identity = ?self.credential.identity(), "authenticating global client");
                authenticate(self.connector.as_ref(), &self.credential).await
            })
            .await
            .cloned()
    }
}

impl MultiTenant {
    async fn authenticate(&self, header: &str) -> Result<Arc<AuthenticatedClient>, AuthError> {
        let credential = parse_authorization(Some(header))?;
        self.cache.resolve(&credential).await
    }

    /// Client bound to a live session. Use through a session keeps the
    /// client's cache entry alive too; a session whose client was already
    /// logged out is closed and reported as not found.
    async fn session_client(&self, session_id: &str) -> Result<Arc<AuthenticatedClient>, AuthError> {
        let not_found = || AuthError::SessionNotFound(session_id.to_string());
        let client = self.sessions.get_client(session_id).await.ok_or_else(not_found)?;

        if client.is_released() {
            warn!(session_id, identity = ?client.identity(), "session outlived its client, closing it");
            self.sessions.evict(session_id).await;
            return Err(not_found());
        }
        self.cache.touch(&client.cache_key());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::HeaderValue;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use futures_util::future::join_all;

    use crate::credentials::CredentialError;
    use crate::test_support::{FakeConnector, FakeTransport};

    fn policy() -> TtlPolicy {
        TtlPolicy::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    fn multi(connector: &Arc<FakeConnector>) -> ClientResolver {
        ClientResolver::multi_tenant(connector.clone(), policy(), policy())
    }

    fn basic(identity: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{identity}:{secret}")))
    }

    fn with_auth(header: String) -> RequestContext {
        RequestContext {
            session_id: None,
            authorization: Some(header),
        }
    }

    fn with_session(id: &str) -> RequestContext {
        RequestContext {
            session_id: Some(id.to_string()),
            authorization: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tenant_logs_in_once_under_concurrency() {
        let connector = FakeConnector::with_delay("pw", Duration::from_millis(100));
        let resolver = ClientResolver::single_tenant(
            connector.clone(),
            Credential::basic("owner@example.com", "pw"),
        );

        let ctx = RequestContext::default();
        let results = join_all((0..8).map(|_| resolver.resolve(&ctx))).await;

        assert_eq!(connector.logins(), 1);
        let first = results[0].as_ref().unwrap();
        assert!(results
            .iter()
            .all(|r| Arc::ptr_eq(first, r.as_ref().unwrap())));

        // Later calls reuse the client regardless of what the request carries.
        let later = resolver.resolve(&with_session("whatever")).await.unwrap();
        assert!(Arc::ptr_eq(first, &later));
        assert_eq!(connector.logins(), 1);
    }

    #[tokio::test]
    async fn test_single_tenant_retries_after_failed_login() {
        let connector = FakeConnector::new("pw");
        let resolver = ClientResolver::single_tenant(
            connector.clone(),
            Credential::basic("owner@example.com", "stale"),
        );

        assert!(matches!(
            resolver.resolve(&RequestContext::default()).await,
            Err(AuthError::Authentication(_))
        ));
        assert!(resolver.resolve(&RequestContext::default()).await.is_err());
        assert_eq!(connector.logins(), 2);
    }

    #[tokio::test]
    async fn test_single_tenant_cleanup_logs_out() {
        let connector = FakeConnector::new("pw");
        let resolver = ClientResolver::single_tenant(
            connector.clone(),
            Credential::basic("owner@example.com", "pw"),
        );

        resolver.cleanup_all().await;
        assert_eq!(connector.logouts(), 0);

        resolver.resolve(&RequestContext::default()).await.unwrap();
        resolver.cleanup_all().await;
        assert_eq!(connector.logouts(), 1);
        assert!(!resolver.is_multi_tenant());
        assert!(!resolver.remove_session("s1"));
    }

    #[tokio::test]
    async fn test_multi_tenant_error_kinds_are_distinct() {
        let connector = FakeConnector::new("pw");
        let resolver = multi(&connector);

        assert!(matches!(
            resolver.resolve(&RequestContext::default()).await,
            Err(AuthError::NotAuthenticated(_))
        ));
        assert!(matches!(
            resolver.resolve(&with_session("missing")).await,
            Err(AuthError::SessionNotFound(id)) if id == "missing"
        ));
        assert!(matches!(
            resolver.resolve(&with_auth("Token abc".into())).await,
            Err(AuthError::Format(CredentialError::UnsupportedScheme))
        ));
        assert!(matches!(
            resolver
                .resolve(&with_auth(basic("user@example.com", "nope")))
                .await,
            Err(AuthError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_multi_tenant_credentials_then_session() {
        let connector = FakeConnector::new("pw");
        let resolver = multi(&connector);
        let header = basic("user@example.com", "pw");

        let client = resolver.authenticate(Some(&header)).await.unwrap();
        let again = resolver.resolve(&with_auth(header)).await.unwrap();
        assert!(Arc::ptr_eq(&client, &again));
        assert_eq!(connector.logins(), 1);

        resolver.create_session("s1", FakeTransport::new(), client.clone());
        assert!(resolver.has_session("s1"));
        let from_session = resolver.resolve(&with_session("s1")).await.unwrap();
        assert!(Arc::ptr_eq(&client, &from_session));

        assert!(resolver.remove_session("s1"));
        assert!(!resolver.remove_session("s1"));
        assert!(matches!(
            resolver.resolve(&with_session("s1")).await,
            Err(AuthError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_use_keeps_its_client_cached() {
        let connector = FakeConnector::new("pw");
        let resolver = multi(&connector);
        let client = resolver
            .authenticate(Some(&basic("user@example.com", "pw")))
            .await
            .unwrap();
        resolver.create_session("s1", FakeTransport::new(), client.clone());

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(30)).await;
            resolver.resolve(&with_session("s1")).await.unwrap();
        }

        assert_eq!(resolver.client_cache().unwrap().sweep_expired().await, 0);
        assert_eq!(connector.logouts(), 0);
        assert!(!client.is_released());
        let again = resolver.resolve(&with_session("s1")).await.unwrap();
        assert!(Arc::ptr_eq(&client, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_with_logged_out_client_is_not_found() {
        let connector = FakeConnector::new("pw");
        let resolver = ClientResolver::multi_tenant(
            connector.clone(),
            TtlPolicy::new(Duration::from_secs(60), Duration::from_secs(100)),
            policy(),
        );
        let client = resolver
            .authenticate(Some(&basic("user@example.com", "pw")))
            .await
            .unwrap();
        let transport = FakeTransport::new();
        resolver.create_session("s1", transport.clone(), client);

        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(30)).await;
            resolver.resolve(&with_session("s1")).await.unwrap();
        }

        // Past the client's lifetime cap, session still fresh.
        assert_eq!(resolver.client_cache().unwrap().sweep_expired().await, 1);
        assert_eq!(connector.logouts(), 1);
        assert!(resolver.has_session("s1"));

        assert!(matches!(
            resolver.resolve(&with_session("s1")).await,
            Err(AuthError::SessionNotFound(id)) if id == "s1"
        ));
        assert!(!resolver.has_session("s1"));
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_session_id_takes_precedence_over_credentials() {
        let connector = FakeConnector::new("pw");
        let resolver = multi(&connector);

        let ctx = RequestContext {
            session_id: Some("gone".into()),
            authorization: Some(basic("user@example.com", "pw")),
        };
        assert!(matches!(
            resolver.resolve(&ctx).await,
            Err(AuthError::SessionNotFound(_))
        ));
        assert_eq!(connector.logins(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_all_closes_sessions_and_logs_out_clients() {
        let connector = FakeConnector::new("pw");
        let resolver = multi(&connector);
        let client = resolver
            .authenticate(Some(&basic("user@example.com", "pw")))
            .await
            .unwrap();
        let t1 = FakeTransport::new();
        let t2 = FakeTransport::new();
        resolver.create_session("s1", t1.clone(), client.clone());
        resolver.create_session("s2", t2.clone(), client);

        assert_eq!(resolver.cleanup_expired().await, (0, 0));
        assert!(resolver.has_session("s1") && resolver.has_session("s2"));

        resolver.cleanup_all().await;
        assert_eq!(resolver.sessions().unwrap().len(), 0);
        assert_eq!(resolver.client_cache().unwrap().len(), 0);
        assert_eq!(t1.closes() + t2.closes(), 2);
        assert_eq!(connector.logouts(), 1);
    }

    #[test]
    fn test_request_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Mcp-Session-Id", HeaderValue::from_static("abc-123"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));

        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.session_id.as_deref(), Some("abc-123"));
        assert_eq!(ctx.authorization.as_deref(), Some("Bearer tok"));
        assert!(format!("{ctx:?}").contains("<redacted>"));

        let empty = RequestContext::from_headers(&HeaderMap::new());
        assert!(empty.session_id.is_none() && empty.authorization.is_none());
    }
}
