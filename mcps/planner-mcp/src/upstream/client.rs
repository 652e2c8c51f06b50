//! HTTP client for the planner API
//!
//! Wire contract:
//! - `POST {base}/auth/login` with `{"email", "password"}` returns `{"token"}`
//! - `POST {base}/rpc/{method}` with a bearer token and JSON arguments
//! - `POST {base}/auth/logout` with a bearer token

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use super::error::{ApiError, ApiResult};

/// Creates authenticated planner clients
#[async_trait]
pub trait ApiConnector: Send + Sync {
    /// Log in with an identity/secret pair
    async fn login(&self, identity: &str, secret: &str) -> ApiResult<Arc<dyn ApiClient>>;

    /// Wrap an already-issued session token
    async fn with_token(&self, token: &str) -> ApiResult<Arc<dyn ApiClient>>;
}

/// An authenticated planner client
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Invoke a planner API method
    async fn call(&self, method: &str, args: Value) -> ApiResult<Value>;

    /// End the upstream session
    async fn logout(&self) -> ApiResult<()>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// [`ApiConnector`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpApiConnector {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpApiConnector {
    pub fn new(base_url: Url, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
        })
    }

    fn client(&self, token: String) -> Arc<dyn ApiClient> {
        Arc::new(HttpApiClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        })
    }
}

#[async_trait]
impl ApiConnector for HttpApiConnector {
    #[instrument(skip(self, secret))]
    async fn login(&self, identity: &str, secret: &str) -> ApiResult<Arc<dyn ApiClient>> {
        let url = self.base_url.join("auth/login")?;
        let request = self
            .http
            .post(url)
            .json(&json!({ "email": identity, "password": secret }));

        let response = send(request).await?;
        let body: LoginResponse = response.json().await?;
        let token = body
            .token
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)?;

        debug!("planner login succeeded");
        Ok(self.client(token))
    }

    async fn with_token(&self, token: &str) -> ApiResult<Arc<dyn ApiClient>> {
        Ok(self.client(token.to_string()))
    }
}

/// [`ApiClient`] backed by `reqwest`
#[derive(Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    #[instrument(skip(self, args))]
    async fn call(&self, method: &str, args: Value) -> ApiResult<Value> {
        let url = self.base_url.join(&format!("rpc/{method}"))?;
        let request = self.http.post(url).bearer_auth(&self.token).json(&args);

        let response = send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(response.json().await?)
    }

    async fn logout(&self) -> ApiResult<()> {
        let url = self.base_url.join("auth/logout")?;
        send(self.http.post(url).bearer_auth(&self.token)).await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> ApiResult<Response> {
    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());
        return Err(ApiError::Status { status, body });
    }
    Ok(response)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
