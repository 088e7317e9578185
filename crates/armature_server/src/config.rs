//! Worker configuration.
//!
//! Loaded once at startup from an optional TOML file, then overridden by
//! `ARMATURE_*` environment variables, then validated. The result is shared
//! read-only behind an `Arc`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Environment variable holding the worker secret
pub const SECRET_ENV: &str = "ARMATURE_WORKER_SECRET";

/// Prefix for secrets injected into every tool call
pub const TOOL_SECRET_PREFIX: &str = "ARMATURE_SECRET_";

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Cannot parse config file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Auth is enabled and no secret was configured
    #[error(
        "No worker secret configured. To fix: run `export {SECRET_ENV}=your_secret_here`, \
         or add `secret = \"your_secret_here\"` to the config file, or start with \
         --disable-auth for local development."
    )]
    MissingSecret,

    /// A field holds an unusable value
    #[error("Invalid config value for '{field}': {reason}. Example: {example}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong
        reason: String,
        /// A valid value
        example: &'static str,
    },
}

/// Worker settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Listen address
    pub bind: String,
    /// Route prefix
    pub base_path: String,
    /// HS256 key for worker tokens
    pub secret: Option<SecretString>,
    /// Skip worker auth
    pub disable_auth: bool,
    /// Deployment label reported in logs and health
    pub environment: String,
    /// Keep stacktraces in wire responses
    pub debug_tracebacks: bool,
    /// Calls allowed to run at once
    pub max_concurrent_calls: usize,
    /// Grace period for in-flight calls at shutdown
    pub shutdown_grace_ms: u64,
    /// Secrets added to every call context
    pub tool_secrets: IndexMap<String, SecretString>,
}

impl WorkerConfig {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind: "127.0.0.1:8002".to_string(),
            base_path: "/worker".to_string(),
            secret: None,
            disable_auth: false,
            environment: "local".to_string(),
            debug_tracebacks: false,
            max_concurrent_calls: 64,
            shutdown_grace_ms: 5_000,
            tool_secrets: IndexMap::new(),
        }
    }

    /// Set the worker secret
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Turn worker auth off
    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.disable_auth = true;
        self
    }

    /// Add a secret injected into every call
    #[must_use]
    pub fn with_tool_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tool_secrets
            .insert(key.into(), SecretString::from(value.into()));
        self
    }

    /// Read `path` when given, apply the process environment, validate
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable or the result is
    /// invalid
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let size = fs::metadata(path).map_err(io)?.len();
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("file is {} bytes; the limit is {}", size, MAX_CONFIG_FILE_SIZE),
            });
        }
        let content = fs::read_to_string(path).map_err(io)?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Apply `ARMATURE_*` overrides from `vars`
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                SECRET_ENV if !value.is_empty() => self.secret = Some(SecretString::from(value)),
                "ARMATURE_ENVIRONMENT" => self.environment = value,
                "ARMATURE_BIND" => self.bind = value,
                "ARMATURE_DISABLE_AUTH" => self.disable_auth = truthy(&value),
                "ARMATURE_DEBUG_TRACEBACKS" => self.debug_tracebacks = truthy(&value),
                _ => {
                    if let Some(name) = key.strip_prefix(TOOL_SECRET_PREFIX) {
                        if !name.is_empty() {
                            self.tool_secrets
                                .insert(name.to_string(), SecretString::from(value));
                        }
                    }
                }
            }
        }
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !self.base_path.starts_with('/') || (self.base_path.len() > 1 && self.base_path.ends_with('/')) {
            return Err(ConfigError::Invalid {
                field: "base_path",
                reason: format!("'{}' must start with '/' and not end with one", self.base_path),
                example: "base_path = \"/worker\"",
            });
        }
        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_calls",
                reason: "must be greater than zero".to_string(),
                example: "max_concurrent_calls = 64",
            });
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "shutdown_grace_ms",
                reason: "must be greater than zero".to_string(),
                example: "shutdown_grace_ms = 5000",
            });
        }
        if !self.disable_auth {
            match &self.secret {
                Some(secret) if !secret.expose_secret().trim().is_empty() => {}
                _ => return Err(ConfigError::MissingSecret),
            }
        }
        Ok(())
    }

    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not `host:port`
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| ConfigError::Invalid {
            field: "bind",
            reason: format!("'{}' is not an IP address and port", self.bind),
            example: "bind = \"127.0.0.1:8002\"",
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_need_a_secret() {
        let err = WorkerConfig::new().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
        assert!(err.to_string().contains("export ARMATURE_WORKER_SECRET="));
        assert!(WorkerConfig::new().without_auth().validate().is_ok());
        assert!(WorkerConfig::new().with_secret("s3cret").validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WorkerConfig::new();
        config.apply_env(vars(&[
            ("ARMATURE_WORKER_SECRET", "from-env"),
            ("ARMATURE_ENVIRONMENT", "staging"),
            ("ARMATURE_DEBUG_TRACEBACKS", "true"),
            ("ARMATURE_SECRET_API_KEY", "k-1"),
            ("ARMATURE_SECRET_", "ignored"),
            ("HOME", "/root"),
        ]));
        assert_eq!(config.secret.unwrap().expose_secret(), "from-env");
        assert_eq!(config.environment, "staging");
        assert!(config.debug_tracebacks);
        assert_eq!(config.tool_secrets.len(), 1);
        assert_eq!(config.tool_secrets["API_KEY"].expose_secret(), "k-1");
    }

    #[test]
    fn test_invalid_values_name_the_field() {
        let mut config = WorkerConfig::new().without_auth();
        config.shutdown_grace_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("shutdown_grace_ms"));
        assert!(err.contains("Example"));

        let mut config = WorkerConfig::new().without_auth();
        config.bind = "localhost".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("'bind'"));

        let mut config = WorkerConfig::new().without_auth();
        config.base_path = "worker/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind = \"0.0.0.0:9000\"\nsecret = \"file-secret\"\nmax_concurrent_calls = 8\n\n[tool_secrets]\nAPI_KEY = \"abc\""
        )
        .unwrap();
        let config = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.max_concurrent_calls, 8);
        assert_eq!(config.base_path, "/worker");
        assert_eq!(config.tool_secrets["API_KEY"].expose_secret(), "abc");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bnd = \"0.0.0.0:9000\"").unwrap();
        let err = WorkerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
