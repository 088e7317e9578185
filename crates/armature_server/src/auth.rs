//! Worker authentication.
//!
//! Callers present `Authorization: Bearer <jwt>`. Tokens are HS256-signed
//! with the worker secret and must carry `aud = "worker"` and `ver = "1"`.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Required audience
pub const WORKER_AUDIENCE: &str = "worker";

/// Supported token version
pub const TOKEN_VERSION: &str = "1";

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header
    #[error("Missing Authorization header. Send 'Authorization: Bearer <token>'.")]
    MissingHeader,

    /// Header present but not a bearer token
    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,

    /// Signature, audience or expiry check failed
    #[error("Invalid worker token: {0}")]
    InvalidToken(String),

    /// Token version this worker does not understand
    #[error("Unsupported worker token version '{found}'; expected '{TOKEN_VERSION}'")]
    UnsupportedVersion {
        /// Version in the token
        found: String,
    },

    /// Token could not be signed
    #[error("Cannot sign worker token: {0}")]
    Signing(String),
}

/// Claims carried by a worker token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerClaims {
    /// Audience
    pub aud: String,
    /// Token format version
    pub ver: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// Mint a worker token valid for `ttl`
///
/// # Errors
///
/// Returns [`AuthError::Signing`] if encoding fails
pub fn issue_token(secret: &SecretString, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = WorkerClaims {
        aud: WORKER_AUDIENCE.to_string(),
        ver: TOKEN_VERSION.to_string(),
        iat: now,
        exp: now.saturating_add(ttl),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Validates bearer tokens against the worker secret
#[derive(Clone)]
pub struct WorkerAuth {
    key: DecodingKey,
    validation: Validation,
}

impl WorkerAuth {
    /// Validator for `secret`
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[WORKER_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Check an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] describing why the caller was rejected
    pub fn authenticate(&self, header: Option<&str>) -> Result<WorkerClaims, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidScheme)?;
        self.validate(token)
    }

    /// Check a raw token
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] or [`AuthError::UnsupportedVersion`]
    pub fn validate(&self, token: &str) -> Result<WorkerClaims, AuthError> {
        let data = decode::<WorkerClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.ver != TOKEN_VERSION {
            return Err(AuthError::UnsupportedVersion {
                found: data.claims.ver,
            });
        }
        Ok(data.claims)
    }
}

impl std::fmt::Debug for WorkerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAuth")
            .field("audience", &WORKER_AUDIENCE)
            .finish_non_exhaustive()
    }
}
