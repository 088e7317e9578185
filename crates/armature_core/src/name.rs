//! Tool and toolkit naming.
//!
//! A tool is identified by `(toolkit_name, toolkit_version, tool_name)`,
//! rendered as `Toolkit.Tool@1.0.0`. Name comparison ignores case and
//! underscores so `say_hello`, `SayHello` and `sayhello` resolve to the
//! same tool.

use crate::error::CoreError;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully-qualified tool name
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct FullyQualifiedName {
    /// Tool name
    pub name: String,
    /// Toolkit name
    pub toolkit_name: String,
    /// Toolkit version; `None` matches any version on lookup
    pub toolkit_version: Option<Version>,
}

impl FullyQualifiedName {
    /// Create a new fully-qualified name
    #[must_use]
    pub fn new(
        toolkit_name: impl Into<String>,
        name: impl Into<String>,
        toolkit_version: Option<Version>,
    ) -> Self {
        Self {
            name: name.into(),
            toolkit_name: toolkit_name.into(),
            toolkit_version,
        }
    }

    /// Same name with the version dropped
    #[must_use]
    pub fn without_version(&self) -> Self {
        Self {
            toolkit_version: None,
            ..self.clone()
        }
    }

    /// Dotted form without version (`Toolkit.Tool`)
    #[must_use]
    pub fn dotted(&self) -> String {
        format!("{}.{}", self.toolkit_name, self.name)
    }

    /// MCP-safe form (`Toolkit_Tool`); MCP tool names cannot contain dots
    #[must_use]
    pub fn mcp_name(&self) -> String {
        format!("{}_{}", self.toolkit_name, self.name)
    }

    /// Whether `other` names the same tool, treating a missing version on
    /// either side as a wildcard
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        if normalize_tool_name(&self.name) != normalize_tool_name(&other.name)
            || normalize_tool_name(&self.toolkit_name) != normalize_tool_name(&other.toolkit_name)
        {
            return false;
        }
        match (&self.toolkit_version, &other.toolkit_version) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl PartialEq for FullyQualifiedName {
    fn eq(&self, other: &Self) -> bool {
        normalize_tool_name(&self.name) == normalize_tool_name(&other.name)
            && normalize_tool_name(&self.toolkit_name) == normalize_tool_name(&other.toolkit_name)
            && self.toolkit_version == other.toolkit_version
    }
}

impl std::hash::Hash for FullyQualifiedName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        normalize_tool_name(&self.name).hash(state);
        normalize_tool_name(&self.toolkit_name).hash(state);
        self.toolkit_version.hash(state);
    }
}

impl fmt::Display for FullyQualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.toolkit_name, self.name)?;
        if let Some(version) = &self.toolkit_version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

impl FromStr for FullyQualifiedName {
    type Err = CoreError;

    /// Parse `Toolkit.Tool` or `Toolkit.Tool@1.0.0`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (qualified, version) = match s.split_once('@') {
            Some((qualified, version)) => (qualified, Some(Version::parse(version)?)),
            None => (s, None),
        };
        let (toolkit, name) = qualified
            .split_once('.')
            .filter(|(toolkit, name)| !toolkit.is_empty() && !name.is_empty())
            .ok_or_else(|| CoreError::ParseError {
                message: format!(
                    "'{}' is not a fully-qualified tool name, expected Toolkit.Tool or Toolkit.Tool@1.0.0",
                    s
                ),
            })?;
        Ok(Self::new(toolkit, name, version))
    }
}

/// Lookup key for tool and toolkit names: lowercase with underscores removed
#[must_use]
pub fn normalize_tool_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Convert a snake_case function name into the PascalCase tool name
#[must_use]
pub fn snake_to_pascal(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Validate a toolkit or tool name: ASCII alphanumerics and underscores,
/// starting with a letter
///
/// # Errors
///
/// Returns error naming valid examples if the name is rejected
pub fn validate_toolkit_name(name: &str) -> Result<(), CoreError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        Some("name must start with a letter")
    } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some("only letters, digits and underscores are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoreError::InvalidName {
            name: name.to_string(),
            reason: format!("{}; valid examples: Greetings, google_drive, Github2", reason),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_version() {
        let fqn = FullyQualifiedName::new("Greetings", "SayHello", Some(Version::new(1, 0, 0)));
        assert_eq!(fqn.to_string(), "Greetings.SayHello@1.0.0");
        assert_eq!(fqn.mcp_name(), "Greetings_SayHello");
        assert_eq!(fqn.dotted(), "Greetings.SayHello");
    }

    #[test]
    fn test_parse_roundtrip() {
        let fqn: FullyQualifiedName = "Greetings.SayHello@1.0.0".parse().unwrap();
        assert_eq!(fqn.toolkit_name, "Greetings");
        assert_eq!(fqn.name, "SayHello");
        assert_eq!(fqn.toolkit_version, Some(Version::new(1, 0, 0)));

        let bare: FullyQualifiedName = "Greetings.SayHello".parse().unwrap();
        assert!(bare.toolkit_version.is_none());
    }

    #[test]
    fn test_parse_rejects_unqualified() {
        assert!("SayHello".parse::<FullyQualifiedName>().is_err());
        assert!(".SayHello".parse::<FullyQualifiedName>().is_err());
    }

    #[test]
    fn test_equality_ignores_case_and_underscores() {
        let a = FullyQualifiedName::new("Greetings", "say_hello", None);
        let b = FullyQualifiedName::new("greetings", "SayHello", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_version_wildcard() {
        let versioned = FullyQualifiedName::new("Greetings", "SayHello", Some(Version::new(1, 0, 0)));
        let other = FullyQualifiedName::new("Greetings", "SayHello", Some(Version::new(2, 0, 0)));
        assert!(versioned.matches(&versioned.without_version()));
        assert!(!versioned.matches(&other));
    }

    #[test]
    fn test_snake_to_pascal() {
        assert_eq!(snake_to_pascal("say_hello"), "SayHello");
        assert_eq!(snake_to_pascal("get_user_v2"), "GetUserV2");
        assert_eq!(snake_to_pascal("already"), "Already");
    }

    #[test]
    fn test_validate_toolkit_name() {
        assert!(validate_toolkit_name("Greetings").is_ok());
        assert!(validate_toolkit_name("google_drive").is_ok());
        let err = validate_toolkit_name("my-toolkit").unwrap_err();
        assert!(err.to_string().contains("valid examples"));
        assert!(validate_toolkit_name("1password").is_err());
        assert!(validate_toolkit_name("").is_err());
    }
}
