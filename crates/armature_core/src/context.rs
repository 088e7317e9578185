//! Per-call execution context.
//!
//! A [`ToolContext`] is created by the dispatcher for exactly one call and
//! dropped when the call finishes. It holds the end user's authorization
//! token and the secrets the tool declared. It implements neither `Clone`
//! nor `Serialize`, and its `Debug` output shows only key names.

use crate::id::ExecutionId;
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Errors raised by context accessors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The secret was never configured
    #[error(
        "Missing secret: '{key}'. To fix: add {key}=your_value_here to your .env file \
         or run `export {key}=your_value_here`, then restart the server."
    )]
    MissingSecret { key: String },

    /// The secret is configured but blank
    #[error(
        "Secret '{key}' is set but empty. To fix: give {key} a non-empty value in your .env \
         file (for example {key}=your_value_here), then restart the server."
    )]
    EmptySecret { key: String },

    /// A metadata entry the tool needs is missing
    #[error("Missing metadata: '{key}'. The caller must supply it in the request context.")]
    MissingMetadata { key: String },
}

impl ContextError {
    /// Key the error refers to
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::MissingSecret { key }
            | Self::EmptySecret { key }
            | Self::MissingMetadata { key } => key,
        }
    }
}

/// Per-invocation bag of credentials and request metadata
pub struct ToolContext {
    execution_id: ExecutionId,
    user_id: Option<String>,
    authorization_token: Option<SecretString>,
    secrets: IndexMap<String, SecretString>,
    metadata: IndexMap<String, String>,
    cancellation: CancellationToken,
}

impl ToolContext {
    /// Create an empty context for one execution
    #[must_use]
    pub fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            user_id: None,
            authorization_token: None,
            secrets: IndexMap::new(),
            metadata: IndexMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the end user id
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the authorization token
    #[must_use]
    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.authorization_token = Some(token);
        self
    }

    /// Add a secret; a later value for the same key replaces the earlier one
    #[must_use]
    pub fn with_secret(mut self, key: impl Into<String>, value: SecretString) -> Self {
        let key = key.into();
        self.secrets.retain(|existing, _| !existing.eq_ignore_ascii_case(&key));
        self.secrets.insert(key, value);
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tie this context to a cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Execution id of the call
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// End user id, when the caller supplied one
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Authorization token, or an empty string when none was supplied
    #[must_use]
    pub fn get_auth_token_or_empty(&self) -> String {
        self.authorization_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_default()
    }

    /// Secret value for `key`, matched case-insensitively
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingSecret`] or
    /// [`ContextError::EmptySecret`] with remediation instructions
    pub fn get_secret(&self, key: &str) -> Result<String, ContextError> {
        let value = self
            .secrets
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.expose_secret())
            .ok_or_else(|| ContextError::MissingSecret {
                key: key.to_string(),
            })?;
        if value.trim().is_empty() {
            return Err(ContextError::EmptySecret {
                key: key.to_string(),
            });
        }
        Ok(value.to_string())
    }

    /// Whether a non-empty secret is configured for `key`
    #[must_use]
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }

    /// Configured secret keys, as supplied
    pub fn secret_keys(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }

    /// Metadata value for `key`
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingMetadata`] if absent
    pub fn get_metadata(&self, key: &str) -> Result<&str, ContextError> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ContextError::MissingMetadata {
                key: key.to_string(),
            })
    }

    /// Cancellation token for the call
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the call has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("execution_id", &self.execution_id)
            .field("user_id", &self.user_id)
            .field("has_auth_token", &self.authorization_token.is_some())
            .field("secret_keys", &self.secrets.keys().collect::<Vec<_>>())
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Authorization block of an inbound request context
#[derive(Deserialize)]
pub struct AuthorizationPayload {
    /// Bearer token for the upstream provider
    #[serde(deserialize_with = "secret")]
    pub token: SecretString,
}

/// One secret in an inbound request context
#[derive(Deserialize)]
pub struct SecretPayload {
    /// Secret key
    pub key: String,
    /// Secret value
    #[serde(deserialize_with = "secret")]
    pub value: SecretString,
}

/// One metadata entry in an inbound request context
#[derive(Debug, Deserialize)]
pub struct MetadataPayload {
    /// Key
    pub key: String,
    /// Value
    pub value: String,
}

/// Wire form of the context inside a call request
///
/// Deserialize-only; there is no path back to the wire.
#[derive(Default, Deserialize)]
pub struct ToolContextPayload {
    /// End-user authorization
    #[serde(default)]
    pub authorization: Option<AuthorizationPayload>,
    /// Secrets
    #[serde(default)]
    pub secrets: Vec<SecretPayload>,
    /// Request metadata
    #[serde(default)]
    pub metadata: Vec<MetadataPayload>,
    /// End user id
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ToolContextPayload {
    /// Build the per-call context
    #[must_use]
    pub fn into_context(self, execution_id: ExecutionId) -> ToolContext {
        let mut context = ToolContext::new(execution_id);
        if let Some(user_id) = self.user_id {
            context = context.with_user_id(user_id);
        }
        if let Some(authorization) = self.authorization {
            context = context.with_auth_token(authorization.token);
        }
        for secret in self.secrets {
            context = context.with_secret(secret.key, secret.value);
        }
        for entry in self.metadata {
            context = context.with_metadata(entry.key, entry.value);
        }
        context
    }
}

impl fmt::Debug for ToolContextPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContextPayload")
            .field("has_authorization", &self.authorization.is_some())
            .field(
                "secret_keys",
                &self.secrets.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            )
            .field("user_id", &self.user_id)
            .finish()
    }
}
