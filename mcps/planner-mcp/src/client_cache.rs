//! Cache of authenticated planner clients keyed by credential hash
//!
//! Concurrent requests carrying the same credential share one login: the
//! first caller registers a pending login under the [`CacheKey`] before the
//! upstream call starts, and every later caller awaits that same login until
//! it settles. The pending slot is cleared on success and on failure, so a
//! rejected login never blocks a retry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::{CacheKey, Credential};
use crate::error::AuthError;
use crate::ttl::{Access, Release, TtlPolicy, TtlRegistry};
use crate::upstream::{ApiClient, ApiConnector};

/// A planner client bound to the credential it logged in with
pub struct AuthenticatedClient {
    client: Arc<dyn ApiClient>,
    identity: Option<String>,
    cache_key: CacheKey,
    released: AtomicBool,
}

impl AuthenticatedClient {
    pub fn new(client: Arc<dyn ApiClient>, identity: Option<String>, cache_key: CacheKey) -> Self {
        Self {
            client,
            identity,
            cache_key,
            released: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &dyn ApiClient {
        self.client.as_ref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn cache_key(&self) -> CacheKey {
        self.cache_key
    }

    /// Set once the client has been evicted and logged out
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("identity", &self.identity)
            .field("cache_key", &self.cache_key)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Release for AuthenticatedClient {
    async fn release(&self) -> anyhow::Result<()> {
        self.released.store(true, Ordering::SeqCst);
        self.client.logout().await?;
        Ok(())
    }
}

/// Log in (or wrap a token) without touching any cache
pub async fn authenticate(
    connector: &dyn ApiConnector,
    credential: &Credential,
) -> Result<Arc<AuthenticatedClient>, AuthError> {
    let client = match credential {
        Credential::Basic { identity, secret } => connector.login(identity, secret).await?,
        Credential::Bearer { token } => connector.with_token(token).await?,
    };
    Ok(Arc::new(AuthenticatedClient::new(
        client,
        credential.identity().map(str::to_string),
        credential.cache_key(),
    )))
}

type LoginResult = Result<Arc<AuthenticatedClient>, AuthError>;
type PendingLogin = Shared<BoxFuture<'static, LoginResult>>;

struct Inner {
    connector: Arc<dyn ApiConnector>,
    entries: TtlRegistry<CacheKey, Arc<AuthenticatedClient>>,
    pending: Mutex<HashMap<CacheKey, PendingLogin>>,
}

/// Credential-keyed cache of [`AuthenticatedClient`]s
#[derive(Clone)]
pub struct ClientCache {
    inner: Arc<Inner>,
}

impl ClientCache {
    pub fn new(connector: Arc<dyn ApiConnector>, policy: TtlPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                entries: TtlRegistry::new("client", policy),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the cached client for `credential`, logging in if needed
    pub async fn resolve(&self, credential: &Credential) -> LoginResult {
        let key = credential.cache_key();

        let (login, stale) = {
            let mut pending = self.inner.pending.lock();
            if let Some(login) = pending.get(&key) {
                debug!(key = %key.short(), "joining in-flight login");
                (login.clone(), None)
            } else {
                let stale = match self.inner.entries.access(&key) {
                    Access::Hit(client) => {
                        debug!(key = %key.short(), "client cache hit");
                        return Ok(client);
                    }
                    Access::Expired(stale) => Some(stale),
                    Access::Missing => None,
                };
                debug!(key = %key.short(), "client cache miss, starting login");
                let login = self.start_login(key, credential.clone());
                pending.insert(key, login.clone());
                (login, stale)
            }
        };

        if let Some(stale) = stale {
            info!(key = %key.short(), "evicting expired client");
            if let Err(e) = stale.release().await {
                warn!(key = %key.short(), error = %e, "logout of expired client failed");
            }
        }

        login.await
    }

    // Runs as its own task so the login settles, and the pending slot is
    // cleared, even if every waiting request goes away.
    fn start_login(&self, key: CacheKey, credential: Credential) -> PendingLogin {
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let result = authenticate(inner.connector.as_ref(), &credential).await;
            match &result {
                Ok(client) => {
                    info!(key = %key.short(), identity = ?client.identity(), "client authenticated");
                    inner.entries.insert(key, client.clone());
                }
                Err(e) => warn!(key = %key.short(), error = %e, "login failed"),
            }
            // Insert before deregistering so no caller can observe neither.
            inner.pending.lock().remove(&key);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(AuthError::Upstream(format!("login task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Slide the idle window of a cached client still in use by a session
    pub fn touch(&self, key: &CacheKey) -> bool {
        self.inner.entries.touch(key)
    }

    /// Evict and log out every expired client
    pub async fn sweep_expired(&self) -> usize {
        let count = self.inner.entries.sweep_expired().await;
        if count > 0 {
            info!(count, remaining = self.len(), "swept expired clients");
        }
        count
    }

    /// Log out and drop every cached client
    pub async fn drain_all(&self) -> usize {
        let count = self.inner.entries.drain_all().await;
        info!(count, "released all cached clients");
        count
    }

    pub fn contains(&self, credential: &Credential) -> bool {
        self.inner.entries.has(&credential.cache_key())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn pending_logins(&self) -> usize {
        self.inner.pending.lock().len()
    }
}
