//! Errors raised by the credential vault.

/// Failure modes surfaced to the request pipeline as `CredentialUnavailable`.
#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    /// The provider has never been authorized; the caller must start an OAuth flow.
    #[error("provider '{0}' has no credential on record, reauthorization required")]
    NotAuthorized(uuid::Uuid),
    /// A refresh attempt against the token endpoint failed transiently (network, 5xx).
    #[error("refreshing credential for provider '{0}' failed: {1}")]
    RefreshFailed(uuid::Uuid, String),
    /// The token endpoint returned `invalid_grant`; the refresh token itself is dead.
    #[error("provider '{0}' refresh token was rejected (invalid_grant), reauthorization required")]
    ReauthorizationRequired(uuid::Uuid),
    /// A refresh produced an `expiry` earlier than the credential already held.
    #[error("provider '{0}' refresh returned a non-monotonic expiry")]
    NonMonotonicExpiry(uuid::Uuid),
    /// The `state` parameter was unknown or already consumed.
    #[error("oauth state parameter is unknown or already used")]
    UnknownState,
    /// The `state` parameter was issued more than 10 minutes ago.
    #[error("oauth state parameter expired")]
    ExpiredState,
    /// No local port in the provider's configured range could be bound for the callback.
    #[error("no callback port available in the configured range")]
    NoCallbackPort,
    /// The provider's dialect has no registered OAuth endpoint bundle.
    #[error("provider dialect '{0}' does not support OAuth")]
    UnsupportedDialect(&'static str),
    /// Underlying persistence failure (SQLite).
    #[error("credential store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// Connection pool failure.
    #[error("credential store pool error: {0}")]
    Pool(#[from] r2d2::Error),
}
