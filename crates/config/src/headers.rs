//! Declarative header transform rules applied to outbound provider requests.

use std::{borrow::Cow, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Deserializer};

/// A header name, matched either literally or against a regex pattern.
#[derive(Debug, Clone)]
pub enum NameOrPattern {
    /// Exact, case-insensitive header name.
    Name(String),
    /// Regex pattern matched against the header name.
    Pattern(NamePattern),
}

impl NameOrPattern {
    /// Returns true if `name` matches this selector.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Name(expected) => expected.eq_ignore_ascii_case(name),
            Self::Pattern(pattern) => pattern.0.is_match(name),
        }
    }
}

/// A compiled regex used to match header names.
#[derive(Debug, Clone)]
pub struct NamePattern(Regex);

impl<'de> Deserialize<'de> for NamePattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Cow::<str>::deserialize(deserializer)?;
        let regex = Regex::new(&raw).map_err(serde::de::Error::custom)?;
        Ok(Self(regex))
    }
}

impl<'de> Deserialize<'de> for NameOrPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Pattern { pattern: String },
            Name(String),
        }

        match Helper::deserialize(deserializer)? {
            Helper::Pattern { pattern } => {
                let regex = Regex::new(&pattern).map_err(serde::de::Error::custom)?;
                Ok(Self::Pattern(NamePattern(regex)))
            }
            Helper::Name(name) => Ok(Self::Name(name)),
        }
    }
}

/// Forward a header from the incoming request to the outbound provider request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderForward {
    /// Header name (or pattern) to look for on the incoming request.
    pub name: NameOrPattern,
    /// Rename the header before sending it upstream.
    #[serde(default)]
    pub rename: Option<String>,
    /// Value to use if the incoming header is absent.
    #[serde(default)]
    pub default: Option<String>,
}

/// Insert a header with a fixed value, unconditionally overriding any prior value.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderInsert {
    /// Header name to insert.
    pub name: String,
    /// Value, may contain `${ENV_VAR}` placeholders expanded at load time.
    pub value: serde_dynamic_string::DynamicString<String>,
}

/// Strip a header from the outbound request.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRemove {
    /// Header name (or pattern) to remove.
    pub name: NameOrPattern,
}

/// Forward a header under a different name, keeping the original too.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRenameDuplicate {
    /// Source header name on the incoming request.
    pub name: String,
    /// Additional header name to duplicate the value into.
    pub rename: String,
}

/// A single outbound header transform rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HeaderRule {
    /// Forward a client header to the provider.
    Forward(HeaderForward),
    /// Insert a fixed header value.
    Insert(HeaderInsert),
    /// Remove a header before forwarding.
    Remove(HeaderRemove),
    /// Duplicate a header under a new name.
    RenameDuplicate(HeaderRenameDuplicate),
}

/// Legacy alias kept for the MCP header-rule wire shape; identical to [`HeaderRule`].
pub type McpHeaderRule = HeaderRule;

impl FromStr for NameOrPattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::Name(s.to_string()))
    }
}
