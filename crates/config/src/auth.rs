//! Bearer-token authentication for the proxy's own ingress.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// The two bearer tokens accepted on every ingress endpoint.
///
/// A request authenticated with `model_token` runs the full pipeline, including
/// upstream dispatch. A request authenticated with `virtual_model_token` runs rule
/// resolution and load-balancer advancement but short-circuits before dispatch,
/// returning a synthesized response — see `AuthMode::DryRun`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Token authorizing real upstream traffic.
    pub model_token: SecretString,
    /// Token authorizing dry-run routing without upstream dispatch.
    #[serde(default)]
    pub virtual_model_token: Option<SecretString>,
}

/// Outcome of matching a bearer token against [`AuthConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Token matched `model_token`; the pipeline dispatches to the upstream.
    Production,
    /// Token matched `virtual_model_token`; the pipeline short-circuits before dispatch.
    DryRun,
}

impl AuthConfig {
    /// Match a bearer token extracted from the request, returning the resulting mode.
    pub fn authenticate(&self, token: &str) -> Option<AuthMode> {
        if constant_time_eq(self.model_token.expose_secret(), token) {
            return Some(AuthMode::Production);
        }

        if let Some(virtual_token) = &self.virtual_model_token
            && constant_time_eq(virtual_token.expose_secret(), token)
        {
            return Some(AuthMode::DryRun);
        }

        None
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());

    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
