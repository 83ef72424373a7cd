//! The credential record and its state machine.

use jiff::Timestamp;
use secrecy::SecretString;
use uuid::Uuid;

/// Clock skew applied when deciding whether a credential needs a refresh.
pub const REFRESH_SKEW: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// `{provider-id, access-token, refresh-token?, id-token?, expiry, token-type, resource-url?,
/// provider-metadata}`
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// The provider this credential authenticates against.
    pub provider_id: Uuid,
    /// The current access token presented to the upstream.
    pub access_token: SecretString,
    /// OAuth refresh token, absent for flows that don't issue one.
    pub refresh_token: Option<SecretString>,
    /// OIDC id token, when the provider issues one.
    pub id_token: Option<SecretString>,
    /// Absolute expiry of `access_token`.
    pub expiry: Timestamp,
    /// Token type as returned by the token endpoint, e.g. `Bearer`.
    pub token_type: String,
    /// Resource server URL, for providers that scope tokens to a resource (RFC 8707).
    pub resource_url: Option<String>,
    /// Opaque provider-specific metadata (e.g. account/org id) carried through refreshes.
    pub provider_metadata: serde_json::Value,
}

impl CredentialRecord {
    /// Whether this credential needs a refresh now, applying [`REFRESH_SKEW`].
    pub fn needs_refresh(&self, now: Timestamp) -> bool {
        now + REFRESH_SKEW >= self.expiry
    }
}

/// `None → Authorizing → Valid → Refreshing → Valid | Failed`.
#[derive(Debug, Clone)]
pub enum CredentialState {
    /// Never authorized.
    None,
    /// An OAuth flow is in progress (authorization code issued, awaiting callback/poll).
    Authorizing,
    /// Holds a usable credential.
    Valid(CredentialRecord),
    /// A refresh is in flight; other callers wait on the per-provider mutex.
    Refreshing,
    /// The last refresh failed with `invalid_grant`; reauthorization is required.
    Failed,
}
