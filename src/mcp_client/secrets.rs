//! Secret values supplied through configuration.

use std::fmt;

use serde::Deserialize;

/// A secret string, either bare or with a human-readable description.
///
/// Deserializes from `"value"` or `{"secret": "value", "description": "..."}`.
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Plain(String),
    Structured {
        secret: String,
        #[serde(default)]
        description: String,
    },
}

impl Secret {
    /// The raw secret value.
    pub fn expose(&self) -> &str {
        match self {
            Secret::Plain(value) => value,
            Secret::Structured { secret, .. } => secret,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Secret::Plain(_) => None,
            Secret::Structured { description, .. } if description.is_empty() => None,
            Secret::Structured { description, .. } => Some(description),
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::Plain(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::Plain(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(description) => write!(f, "Secret(**********, {description:?})"),
            None => f.write_str("Secret(**********)"),
        }
    }
}
