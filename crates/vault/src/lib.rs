//! The credential vault: per-provider secret storage and OAuth token lifecycle.
//!
//! Refresh coalescing falls directly out of the data structure: one `Mutex` per
//! provider id. The first caller to observe an expired token takes the lock, performs
//! the HTTP refresh, writes the result back, and releases; every other caller for the
//! same provider blocks on the same lock and re-reads a token that is now fresh.

mod callback;
mod credential;
pub mod error;
mod flow;
mod pkce;
mod refresh;
mod state;
pub mod store;

use std::sync::Arc;

use config::{Provider, ProviderAuth};
use dashmap::DashMap;
use jiff::Timestamp;
use secrecy::SecretString;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use credential::{CredentialRecord, CredentialState};
pub use error::VaultError;
pub use flow::{OAuthEndpoints, OAuthFlow, registry};
pub use pkce::PkcePair;
pub use refresh::{ClientCredentials, DevicePollOutcome};
pub use state::{StateEntry, StateStore};
pub use store::CredentialStore;

struct Slot {
    state: CredentialState,
}

/// Per-provider OAuth state and static-key passthrough.
pub struct Vault {
    http: reqwest::Client,
    store: CredentialStore,
    slots: DashMap<Uuid, Arc<Mutex<Slot>>>,
    pending: StateStore,
}

impl Vault {
    /// Construct a vault backed by `store`, using `http` for token-endpoint calls.
    pub fn new(http: reqwest::Client, store: CredentialStore) -> Self {
        Self {
            http,
            store,
            slots: DashMap::new(),
            pending: StateStore::new(),
        }
    }

    /// Pending-authorization state store, exposed for the OAuth initiation/callback
    /// operations in [`crate::oauth`].
    pub fn pending(&self) -> &StateStore {
        &self.pending
    }

    fn slot(&self, provider_id: Uuid) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(provider_id)
            .or_insert_with(|| Arc::new(Mutex::new(Slot { state: CredentialState::None })))
            .clone()
    }

    /// Resolve the bearer token to attach to an outbound request for `provider`.
    ///
    /// For [`ProviderAuth::StaticKey`] this never touches the network or a mutex. For
    /// [`ProviderAuth::OAuth`] this performs the full refresh-coalescing dance.
    pub async fn token(&self, provider: &Provider) -> Result<SecretString, VaultError> {
        match &provider.auth {
            ProviderAuth::StaticKey { api_key } => Ok(api_key.clone()),
            ProviderAuth::OAuth { client_id, client_secret } => {
                let endpoints =
                    registry(provider.dialect).ok_or(VaultError::UnsupportedDialect(dialect_name(provider.dialect)))?;

                self.oauth_token(provider.id, &endpoints, client_id.as_deref(), client_secret.as_ref())
                    .await
            }
        }
    }

    /// Refresh-coalescing token resolution against an explicit endpoint bundle, so
    /// callers (and tests) can target a token endpoint other than the dialect's
    /// registered default.
    async fn oauth_token(
        &self,
        provider_id: Uuid,
        endpoints: &OAuthEndpoints,
        client_id: Option<&str>,
        client_secret: Option<&SecretString>,
    ) -> Result<SecretString, VaultError> {
        use secrecy::ExposeSecret;

        let slot = self.slot(provider_id);
        let mut guard = slot.lock().await;

        // Hydrate from the persistent store on first touch in this process.
        if matches!(guard.state, CredentialState::None)
            && let Some(record) = self.store.load(provider_id)?
        {
            guard.state = CredentialState::Valid(record);
        }

        let current = match &guard.state {
            CredentialState::Valid(record) => record.clone(),
            CredentialState::Failed => return Err(VaultError::ReauthorizationRequired(provider_id)),
            CredentialState::None | CredentialState::Authorizing => {
                return Err(VaultError::NotAuthorized(provider_id));
            }
            CredentialState::Refreshing => unreachable!("mutex excludes concurrent Refreshing observers"),
        };

        if !current.needs_refresh(Timestamp::now()) {
            return Ok(current.access_token.clone());
        }

        guard.state = CredentialState::Refreshing;

        let client_id = client_id.unwrap_or_default();
        let client_secret = client_secret.map(|s| s.expose_secret().to_string());
        let creds = ClientCredentials {
            client_id,
            client_secret: client_secret.as_deref(),
        };

        match refresh::refresh(&self.http, endpoints, &creds, provider_id, &current).await {
            Ok(refreshed) => {
                self.store.upsert(&refreshed)?;
                let token = refreshed.access_token.clone();
                guard.state = CredentialState::Valid(refreshed);
                Ok(token)
            }
            Err(VaultError::ReauthorizationRequired(id)) => {
                guard.state = CredentialState::Failed;
                self.store.delete(provider_id).ok();
                Err(VaultError::ReauthorizationRequired(id))
            }
            Err(e) => {
                // Transient failure: fall back to Valid so the *next* request retries
                // rather than being permanently wedged in Failed.
                guard.state = CredentialState::Valid(current);
                Err(e)
            }
        }
    }

    /// Exercises refresh coalescing against an explicit endpoint bundle rather than a
    /// dialect's registered default, so integration tests can point it at a mock token
    /// endpoint.
    #[doc(hidden)]
    pub async fn oauth_token_for_test(
        &self,
        provider_id: Uuid,
        endpoints: &OAuthEndpoints,
        client_id: Option<&str>,
        client_secret: Option<&SecretString>,
    ) -> Result<SecretString, VaultError> {
        self.oauth_token(provider_id, endpoints, client_id, client_secret).await
    }

    /// Record a freshly issued credential (from an authorization-code/device-code
    /// exchange), transitioning the provider into `Valid` and persisting it.
    pub async fn store_issued(&self, record: CredentialRecord) -> Result<(), VaultError> {
        self.store.upsert(&record)?;
        let slot = self.slot(record.provider_id);
        let mut guard = slot.lock().await;
        guard.state = CredentialState::Valid(record);
        Ok(())
    }

    /// Mark a provider as mid-authorization (authorization code issued or device code
    /// polling loop started), so concurrent requests see `NotAuthorized` rather than a
    /// stale `None`.
    pub async fn mark_authorizing(&self, provider_id: Uuid) {
        let slot = self.slot(provider_id);
        let mut guard = slot.lock().await;
        if matches!(guard.state, CredentialState::None) {
            guard.state = CredentialState::Authorizing;
        }
    }

    /// Drop a provider's credential, returning it to `None` (forced reauthorization).
    pub async fn revoke(&self, provider_id: Uuid) -> Result<(), VaultError> {
        self.store.delete(provider_id)?;
        let slot = self.slot(provider_id);
        let mut guard = slot.lock().await;
        guard.state = CredentialState::None;
        Ok(())
    }

    /// HTTP client shared with OAuth flow helpers.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

fn dialect_name(dialect: config::Dialect) -> &'static str {
    match dialect {
        config::Dialect::Openai => "openai",
        config::Dialect::Anthropic => "anthropic",
        config::Dialect::Google => "google",
    }
}

pub mod oauth;
