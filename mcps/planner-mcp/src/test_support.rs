//! In-memory doubles for the planner API and session transports

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::sessions::SessionTransport;
use crate::upstream::{ApiClient, ApiConnector, ApiError, ApiResult};

/// Accepts exactly one password; any bearer token is accepted
pub struct FakeConnector {
    password: String,
    delay: Duration,
    pub logins: AtomicUsize,
    pub token_clients: AtomicUsize,
    pub logouts: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(password: &str) -> Arc<Self> {
        Self::with_delay(password, Duration::ZERO)
    }

    pub fn with_delay(password: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            password: password.to_string(),
            delay,
            logins: AtomicUsize::new(0),
            token_clients: AtomicUsize::new(0),
            logouts: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiConnector for FakeConnector {
    async fn login(&self, identity: &str, secret: &str) -> ApiResult<Arc<dyn ApiClient>> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if secret != self.password {
            return Err(ApiError::Unauthorized);
        }
        Ok(Arc::new(FakeClient {
            identity: identity.to_string(),
            logouts: self.logouts.clone(),
        }))
    }

    async fn with_token(&self, token: &str) -> ApiResult<Arc<dyn ApiClient>> {
        self.token_clients.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeClient {
            identity: format!("token:{token}"),
            logouts: self.logouts.clone(),
        }))
    }
}

/// Echoes every call back with the identity it was authenticated as
pub struct FakeClient {
    identity: String,
    logouts: Arc<AtomicUsize>,
}

#[async_trait]
impl ApiClient for FakeClient {
    async fn call(&self, method: &str, args: Value) -> ApiResult<Value> {
        Ok(json!({ "method": method, "args": args, "identity": self.identity }))
    }

    async fn logout(&self) -> ApiResult<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport that counts close calls and can be told to fail them
pub struct FakeTransport {
    pub closes: AtomicUsize,
    fail: bool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closes: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            closes: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("transport already gone");
        }
        Ok(())
    }
}
