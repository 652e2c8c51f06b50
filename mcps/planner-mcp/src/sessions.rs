//! Registry of multi-tenant MCP sessions
//!
//! A session pairs the transport the server issued an `Mcp-Session-Id` for
//! with the [`AuthenticatedClient`] that was resolved when the session was
//! initialized. Sessions expire on their own idle/lifetime policy,
//! independently of the client cache.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::client_cache::AuthenticatedClient;
use crate::ttl::{Release, TtlPolicy, TtlRegistry};

/// Handle to the transport that carries a session
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Tear the transport down. Called on expiry and on shutdown.
    async fn close(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SessionEntry {
    pub transport: Arc<dyn SessionTransport>,
    pub client: Arc<AuthenticatedClient>,
}

#[async_trait]
impl Release for SessionEntry {
    async fn release(&self) -> anyhow::Result<()> {
        self.transport.close().await
    }
}

pub struct SessionManager {
    sessions: TtlRegistry<String, SessionEntry>,
}

impl SessionManager {
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            sessions: TtlRegistry::new("session", policy),
        }
    }

    /// Register a session. An existing entry under the same id is replaced
    /// without closing its transport.
    pub fn create(
        &self,
        session_id: impl Into<String>,
        transport: Arc<dyn SessionTransport>,
        client: Arc<AuthenticatedClient>,
    ) {
        let session_id = session_id.into();
        let identity = client.identity().map(str::to_string);
        let entry = SessionEntry { transport, client };

        if self.sessions.insert(session_id.clone(), entry).is_some() {
            warn!(session_id = %session_id, "session id collision, replacing existing session");
        }
        info!(
            session_id = %session_id,
            identity = ?identity,
            active = self.sessions.len(),
            "session created"
        );
    }

    /// Look up a live session, sliding its idle window
    pub async fn get(&self, session_id: &str) -> Option<SessionEntry> {
        let entry = self.sessions.get(&session_id.to_string()).await;
        if entry.is_none() {
            debug!(session_id, "session not found or expired");
        }
        entry
    }

    pub async fn get_transport(&self, session_id: &str) -> Option<Arc<dyn SessionTransport>> {
        self.get(session_id).await.map(|entry| entry.transport)
    }

    pub async fn get_client(&self, session_id: &str) -> Option<Arc<AuthenticatedClient>> {
        self.get(session_id).await.map(|entry| entry.client)
    }

    /// Same validity rule as [`get`](Self::get), without touching the entry
    pub fn has(&self, session_id: &str) -> bool {
        self.sessions.has(&session_id.to_string())
    }

    /// Drop a session without closing its transport
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(&session_id.to_string()).is_some();
        if removed {
            info!(session_id, active = self.sessions.len(), "session removed");
        }
        removed
    }

    /// Close a session's transport and drop it
    pub async fn evict(&self, session_id: &str) -> bool {
        let evicted = self.sessions.evict(&session_id.to_string()).await;
        if evicted {
            info!(session_id, active = self.sessions.len(), "session evicted");
        }
        evicted
    }

    /// Close and drop every expired session
    pub async fn sweep_expired(&self) -> usize {
        let count = self.sessions.sweep_expired().await;
        if count > 0 {
            info!(count, remaining = self.len(), "swept expired sessions");
        }
        count
    }

    /// Close and drop every session
    pub async fn drain_all(&self) -> usize {
        let count = self.sessions.drain_all().await;
        info!(count, "closed all sessions");
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
