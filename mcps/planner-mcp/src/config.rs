//! Configuration loading for planner-mcp
//!
//! Values are taken from, highest priority first:
//! 1. Command-line flags and `PLANNER_*` environment variables
//! 2. The TOML file named by `--config` / `PLANNER_CONFIG_PATH`
//! 3. Defaults
//!
//! Everything is validated once at startup. An invalid value is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::credentials::Credential;
use crate::ttl::TtlPolicy;

/// Smallest accepted idle timeout or max lifetime
pub const MIN_TTL_SECS: u64 = 60;
/// Smallest accepted sweep interval
pub const MIN_SWEEP_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("planner API URL is not set (PLANNER_API_URL or [api].base_url)")]
    MissingApiUrl,

    #[error("invalid planner API URL {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("HTTP port must be between 1 and 65535")]
    InvalidPort,

    #[error("invalid HTTP endpoint {0:?}: must start with '/' and contain no whitespace")]
    InvalidEndpoint(String),

    #[error("{name} is {value}s, minimum is {min}s")]
    BelowMinimum {
        name: &'static str,
        value: u64,
        min: u64,
    },

    #[error("stdio mode needs PLANNER_EMAIL and PLANNER_PASSWORD, or PLANNER_TOKEN")]
    MissingCredentials,

    #[error("PLANNER_EMAIL and PLANNER_PASSWORD must be set together")]
    IncompleteCredentials,

    #[error("set either PLANNER_TOKEN or PLANNER_EMAIL/PLANNER_PASSWORD, not both")]
    ConflictingCredentials,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// One process, one user, credentials from the environment
    #[default]
    Stdio,
    /// Streamable HTTP, credentials per request
    Http,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

/// Expiry policy and sweep cadence for both registries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub client_idle_timeout: Duration,
    pub client_max_lifetime: Duration,
    pub session_idle_timeout: Duration,
    pub session_max_lifetime: Duration,
    pub client_sweep_interval: Duration,
    pub session_sweep_interval: Duration,
}

impl TtlConfig {
    pub fn client_policy(&self) -> TtlPolicy {
        TtlPolicy::new(self.client_idle_timeout, self.client_max_lifetime)
    }

    pub fn session_policy(&self) -> TtlPolicy {
        TtlPolicy::new(self.session_idle_timeout, self.session_max_lifetime)
    }
}

/// Fully resolved, validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportMode,
    pub http: HttpConfig,
    pub api: ApiConfig,
    /// Process-wide credential for stdio mode
    pub credential: Option<Credential>,
    pub ttl: TtlConfig,
}

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    transport: Option<TransportMode>,
    http: FileHttp,
    api: FileApi,
    auth: FileAuth,
    ttl: FileTtl,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileHttp {
    host: Option<String>,
    port: Option<u16>,
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileApi {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileAuth {
    email: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileTtl {
    client_idle_timeout_secs: Option<u64>,
    client_max_lifetime_secs: Option<u64>,
    session_idle_timeout_secs: Option<u64>,
    session_max_lifetime_secs: Option<u64>,
    client_sweep_interval_secs: Option<u64>,
    session_sweep_interval_secs: Option<u64>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_endpoint() -> String {
    "/mcp".to_string()
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_max_lifetime_secs() -> u64 {
    86_400 // 24 hours
}

fn default_sweep_interval_secs() -> u64 {
    300 // 5 minutes
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Merge CLI/env, the optional config file and defaults, then validate
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                FileConfig::read(path)?
            }
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let transport = cli.transport.or(file.transport).unwrap_or_default();

        let http = HttpConfig {
            host: pick(cli.host.clone(), file.http.host, default_host),
            port: pick(cli.port, file.http.port, default_port),
            endpoint: pick(cli.endpoint.clone(), file.http.endpoint, default_endpoint),
        };

        let raw_url = cli
            .api_url
            .clone()
            .or(file.api.base_url)
            .ok_or(ConfigError::MissingApiUrl)?;
        let timeout_secs = pick(cli.api_timeout_secs, file.api.timeout_secs, default_api_timeout_secs);
        let api = ApiConfig {
            base_url: parse_api_url(&raw_url)?,
            timeout: Duration::from_secs(timeout_secs),
        };

        let credential = credential(
            cli.email.clone().or(file.auth.email),
            cli.password.clone().or(file.auth.password),
            cli.token.clone().or(file.auth.token),
        )?;

        let ttl = &file.ttl;
        let ttl = TtlConfig {
            client_idle_timeout: secs(
                "client idle timeout",
                pick(cli.client_idle_timeout_secs, ttl.client_idle_timeout_secs, default_idle_timeout_secs),
                MIN_TTL_SECS,
            )?,
            client_max_lifetime: secs(
                "client max lifetime",
                pick(cli.client_max_lifetime_secs, ttl.client_max_lifetime_secs, default_max_lifetime_secs),
                MIN_TTL_SECS,
            )?,
            session_idle_timeout: secs(
                "session idle timeout",
                pick(cli.session_idle_timeout_secs, ttl.session_idle_timeout_secs, default_idle_timeout_secs),
                MIN_TTL_SECS,
            )?,
            session_max_lifetime: secs(
                "session max lifetime",
                pick(cli.session_max_lifetime_secs, ttl.session_max_lifetime_secs, default_max_lifetime_secs),
                MIN_TTL_SECS,
            )?,
            client_sweep_interval: secs(
                "client sweep interval",
                pick(cli.client_sweep_interval_secs, ttl.client_sweep_interval_secs, default_sweep_interval_secs),
                MIN_SWEEP_INTERVAL_SECS,
            )?,
            session_sweep_interval: secs(
                "session sweep interval",
                pick(cli.session_sweep_interval_secs, ttl.session_sweep_interval_secs, default_sweep_interval_secs),
                MIN_SWEEP_INTERVAL_SECS,
            )?,
        };

        let config = Self {
            transport,
            http,
            api,
            credential,
            ttl,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that depend on more than one field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                name: "API timeout",
                value: 0,
                min: 1,
            });
        }

        match self.transport {
            TransportMode::Stdio => {
                if self.credential.is_none() {
                    return Err(ConfigError::MissingCredentials);
                }
            }
            TransportMode::Http => {
                if self.http.port == 0 {
                    return Err(ConfigError::InvalidPort);
                }
                let endpoint = &self.http.endpoint;
                if !endpoint.starts_with('/') || endpoint.chars().any(char::is_whitespace) {
                    return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
                }
                if self.credential.is_some() {
                    tracing::warn!("ignoring PLANNER_EMAIL/PLANNER_PASSWORD/PLANNER_TOKEN in http mode");
                }
            }
        }
        Ok(())
    }
}

fn pick<T>(cli: Option<T>, file: Option<T>, default: fn() -> T) -> T {
    cli.or(file).unwrap_or_else(default)
}

fn secs(name: &'static str, value: u64, min: u64) -> Result<Duration, ConfigError> {
    if value < min {
        return Err(ConfigError::BelowMinimum { name, value, min });
    }
    Ok(Duration::from_secs(value))
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

fn credential(
    email: Option<String>,
    password: Option<String>,
    token: Option<String>,
) -> Result<Option<Credential>, ConfigError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    match (non_empty(email), password, non_empty(token)) {
        (Some(_), _, Some(_)) => Err(ConfigError::ConflictingCredentials),
        (None, None, Some(token)) => Ok(Some(Credential::bearer(token))),
        (None, Some(_), Some(_)) => Err(ConfigError::ConflictingCredentials),
        (Some(email), Some(password), None) => Ok(Some(Credential::basic(email, password))),
        (Some(_), None, None) | (None, Some(_), None) => Err(ConfigError::IncompleteCredentials),
        (None, None, None) => Ok(None),
    }
}
