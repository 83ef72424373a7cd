//! A `serde`-compatible wrapper that expands `${ENV_VAR}` placeholders found in string
//! values at deserialization time, before parsing the result into the target type.
//!
//! ```
//! use serde_dynamic_string::DynamicString;
//!
//! temp_env::with_var("GREETING", Some("hello"), || {
//!     let value: DynamicString<String> = "${GREETING}, world".parse().unwrap();
//!     assert_eq!(value.into_inner(), "hello, world");
//! });
//! ```

use std::{fmt, marker::PhantomData, str::FromStr};

use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use serde_with::{DeserializeAs, SerializeAs};

/// Matches `${NAME}` or `${NAME:-default}` placeholders.
fn placeholder_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").unwrap())
}

/// Expand every `${ENV_VAR}` and `${ENV_VAR:-default}` placeholder found in `input`.
///
/// Returns an error naming the first unset variable that has no default.
pub fn expand(input: &str) -> Result<String, String> {
    let mut error = None;

    let expanded = placeholder_re()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let default = caps.get(3).map(|m| m.as_str());

            match (std::env::var(name), default) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => {
                    error = Some(format!("environment variable '{name}' is not set"));
                    String::new()
                }
            }
        })
        .into_owned();

    match error {
        Some(error) => Err(error),
        None => Ok(expanded),
    }
}

/// A value parsed from a string after environment-variable placeholders within it have
/// been expanded. `T` must implement [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicString<T>(T);

impl<T> DynamicString<T> {
    /// Unwrap the parsed, expanded value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for DynamicString<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: FromStr> FromStr for DynamicString<T>
where
    T::Err: fmt::Display,
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expanded = expand(s)?;
        let value = expanded.parse::<T>().map_err(|e| e.to_string())?;
        Ok(Self(value))
    }
}

impl<'de, T> Deserialize<'de> for DynamicString<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Self>().map_err(de::Error::custom)
    }
}

/// Adapter for use with `#[serde_with::serde_as]` on fields that are not themselves
/// `DynamicString<T>`, e.g. `Vec<String>` where every element should be expanded.
pub struct ExpandEach<T>(PhantomData<T>);

impl<'de, T> DeserializeAs<'de, T> for ExpandEach<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize_as<D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
    {
        DynamicString::<T>::deserialize(deserializer).map(DynamicString::into_inner)
    }
}

impl<T> SerializeAs<T> for ExpandEach<T>
where
    T: fmt::Display,
{
    fn serialize_as<S>(source: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_existing_var() {
        temp_env::with_var("DYNAMIC_STRING_TEST_A", Some("value"), || {
            assert_eq!(expand("prefix-${DYNAMIC_STRING_TEST_A}-suffix").unwrap(), "prefix-value-suffix");
        });
    }

    #[test]
    fn falls_back_to_default() {
        temp_env::with_var_unset("DYNAMIC_STRING_TEST_B", || {
            assert_eq!(expand("${DYNAMIC_STRING_TEST_B:-fallback}").unwrap(), "fallback");
        });
    }

    #[test]
    fn errors_on_missing_var_without_default() {
        temp_env::with_var_unset("DYNAMIC_STRING_TEST_C", || {
            assert!(expand("${DYNAMIC_STRING_TEST_C}").is_err());
        });
    }

    #[test]
    fn parses_into_target_type() {
        temp_env::with_var("DYNAMIC_STRING_TEST_D", Some("42"), || {
            let value: DynamicString<u32> = "${DYNAMIC_STRING_TEST_D}".parse().unwrap();
            assert_eq!(value.into_inner(), 42);
        });
    }
}
