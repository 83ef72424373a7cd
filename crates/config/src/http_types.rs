//! Validated wrappers around header names/values, for use in declarative header maps.

use std::fmt;

use ascii::AsciiString;
use serde::{Deserialize, Deserializer};

/// A validated HTTP/gRPC-metadata header name (lowercase ASCII, as sent on the wire).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeaderName(AsciiString);

impl HeaderName {
    /// Borrow the underlying ASCII string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HeaderName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let ascii = AsciiString::from_ascii(raw).map_err(serde::de::Error::custom)?;
        Ok(Self(ascii))
    }
}

/// A validated HTTP/gRPC-metadata header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue(AsciiString);

impl HeaderValue {
    /// Borrow the underlying ASCII string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HeaderValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let expanded = serde_dynamic_string::expand(&raw).map_err(serde::de::Error::custom)?;
        let ascii = AsciiString::from_ascii(expanded).map_err(serde::de::Error::custom)?;
        Ok(Self(ascii))
    }
}
