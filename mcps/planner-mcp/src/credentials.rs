//! Authorization header parsing and credential hashing
//!
//! Two schemes are accepted:
//! - `Basic base64(identity:secret)`
//! - `Bearer <token>`
//!
//! Credentials are never used directly as lookup keys. [`CacheKey`] is a
//! SHA-256 digest of the credential and is the only thing the client cache
//! indexes on.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reasons an `Authorization` header could not be turned into a [`Credential`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("missing Authorization header")]
    Missing,

    #[error("unsupported authorization scheme, expected Basic or Bearer")]
    UnsupportedScheme,

    #[error("Basic credentials are not valid base64")]
    InvalidBase64,

    #[error("Basic credentials are not valid UTF-8")]
    InvalidUtf8,

    #[error("Basic credentials must be of the form identity:secret")]
    MissingSeparator,

    #[error("Basic credentials have an empty identity")]
    EmptyIdentity,

    #[error("Bearer token is empty")]
    EmptyToken,
}

/// A parsed caller credential
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Identity/secret pair from the Basic scheme
    Basic { identity: String, secret: String },
    /// Opaque token from the Bearer scheme
    Bearer { token: String },
}

impl Credential {
    pub fn basic(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::Basic {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Display identity, when the scheme carries one
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Basic { identity, .. } => Some(identity),
            Self::Bearer { .. } => None,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from(self)
    }
}

// Secrets must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { identity, .. } => f
                .debug_struct("Basic")
                .field("identity", identity)
                .field("secret", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Fixed-length digest identifying a credential
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Short prefix suitable for log lines
    pub fn short(&self) -> String {
        self.to_string()[..12].to_string()
    }
}

impl From<&Credential> for CacheKey {
    fn from(credential: &Credential) -> Self {
        let mut hasher = Sha256::new();
        match credential {
            Credential::Basic { identity, secret } => {
                hasher.update(b"basic");
                update_field(&mut hasher, identity);
                update_field(&mut hasher, secret);
            }
            Credential::Bearer { token } => {
                hasher.update(b"bearer");
                update_field(&mut hasher, token);
            }
        }
        Self(hasher.finalize().into())
    }
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.short())
    }
}

/// Parse a raw `Authorization` header value
///
/// The Basic payload is split on the first colon only, so secrets may
/// contain colons. An empty secret is accepted; an empty identity is not.
pub fn parse_authorization(header: Option<&str>) -> Result<Credential, CredentialError> {
    let header = header.map(str::trim_start).ok_or(CredentialError::Missing)?;
    if header.trim_end().is_empty() {
        return Err(CredentialError::Missing);
    }

    // A bare scheme carries an empty payload.
    let (scheme, rest) = header
        .split_once(|c: char| c.is_ascii_whitespace())
        .unwrap_or((header.trim_end(), ""));

    if scheme.eq_ignore_ascii_case("basic") {
        parse_basic(rest.trim())
    } else if scheme.eq_ignore_ascii_case("bearer") {
        let token = rest.trim();
        if token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(Credential::bearer(token))
    } else {
        Err(CredentialError::UnsupportedScheme)
    }
}

fn parse_basic(encoded: &str) -> Result<Credential, CredentialError> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| CredentialError::InvalidBase64)?;
    let decoded = String::from_utf8(decoded).map_err(|_| CredentialError::InvalidUtf8)?;

    let (identity, secret) = decoded
        .split_once(':')
        .ok_or(CredentialError::MissingSeparator)?;
    if identity.is_empty() {
        return Err(CredentialError::EmptyIdentity);
    }

    Ok(Credential::basic(identity, secret))
}
