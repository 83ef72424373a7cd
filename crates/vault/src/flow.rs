//! OAuth flow variants and the static endpoint/scope registry.
//!
//! A variant type with three constructors rather than a trait hierarchy — there is no
//! behavior that differs enough between flows to warrant dynamic dispatch, just a
//! different shape of authorization request and token exchange.

use config::Dialect;

/// Which OAuth dance a provider's registry entry uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthFlow {
    /// Standard RFC 6749 authorization code grant.
    AuthCode,
    /// Authorization code grant with RFC 7636 PKCE.
    AuthCodePkce,
    /// RFC 8628 device authorization grant, optionally paired with PKCE.
    DeviceCode {
        /// Whether the device flow also verifies a PKCE challenge on token exchange.
        pkce: bool,
    },
}

/// The fixed endpoint/scope bundle for a provider known to support OAuth.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    /// Which flow this provider uses.
    pub flow: OAuthFlow,
    /// Authorization endpoint, used by [`OAuthFlow::AuthCode`]/[`OAuthFlow::AuthCodePkce`].
    pub authorize_url: &'static str,
    /// Device authorization endpoint, used by [`OAuthFlow::DeviceCode`].
    pub device_authorize_url: &'static str,
    /// Token endpoint, used by every flow.
    pub token_url: &'static str,
    /// Space-joined scopes requested.
    pub scopes: &'static str,
    /// Callback path the provider redirects back to.
    pub callback_path: &'static str,
    /// Local ports tried in order when binding the callback listener.
    pub callback_ports: &'static [u16],
}

/// Static table keyed by dialect, holding the OAuth bundle for dialects that support it.
///
/// Bedrock-style static-key-only providers and plain OpenAI-compatible endpoints never
/// enter `Authorizing`; they are simply absent from this table.
pub fn registry(dialect: Dialect) -> Option<OAuthEndpoints> {
    match dialect {
        Dialect::Anthropic => Some(OAuthEndpoints {
            flow: OAuthFlow::AuthCodePkce,
            authorize_url: "https://claude.ai/oauth/authorize",
            device_authorize_url: "",
            token_url: "https://console.anthropic.com/v1/oauth/token",
            scopes: "org:create_api_key user:profile user:inference",
            callback_path: "/oauth/anthropic/callback",
            callback_ports: &[54545, 54546, 54547],
        }),
        Dialect::Google => Some(OAuthEndpoints {
            flow: OAuthFlow::DeviceCode { pkce: false },
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
            device_authorize_url: "https://oauth2.googleapis.com/device/code",
            token_url: "https://oauth2.googleapis.com/token",
            scopes: "https://www.googleapis.com/auth/cloud-platform",
            callback_path: "/oauth/google/callback",
            callback_ports: &[54560, 54561, 54562],
        }),
        Dialect::Openai => None,
    }
}
