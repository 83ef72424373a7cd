//! OAuth initiation and callback handling, exposed as a library surface with no HTTP
//! binding — the admin UI collaborator calls these directly.

use uuid::Uuid;

use crate::{
    Vault,
    error::VaultError,
    flow::{OAuthFlow, registry},
    pkce::PkcePair,
    refresh::{self, ClientCredentials, DevicePollOutcome},
};

/// The URL to send the user's browser to, and the local callback binding to wait on.
pub struct AuthCodeAttempt {
    /// Fully-formed authorization URL to open in a browser.
    pub authorize_url: String,
    /// The `state` value embedded in `authorize_url`; also the [`crate::StateStore`] key.
    pub state: String,
    /// Local port the callback listener bound, for display/diagnostics.
    pub callback_port: u16,
}

/// Start an authorization-code (optionally PKCE) flow for `provider_id`.
pub async fn begin_auth_code(
    vault: &Vault,
    provider_id: Uuid,
    dialect: config::Dialect,
    client_id: &str,
    session_id: String,
) -> Result<AuthCodeAttempt, VaultError> {
    let endpoints = registry(dialect).ok_or(VaultError::UnsupportedDialect(dialect_name(dialect)))?;

    if !matches!(endpoints.flow, OAuthFlow::AuthCode | OAuthFlow::AuthCodePkce) {
        return Err(VaultError::UnsupportedDialect(dialect_name(dialect)));
    }

    let pkce = matches!(endpoints.flow, OAuthFlow::AuthCodePkce).then(PkcePair::generate);
    let nonce = Uuid::new_v4().to_string();

    let (listener, port) = crate::callback::bind(&endpoints).await?;
    // The listener is handed off to `complete_auth_code` by the caller re-binding on
    // the same port is unnecessary: we drop it here and let the caller `accept_one` on
    // its own bound listener via `redirect_uri`. Keeping the probe and the accept in
    // the same call would block this function until the browser round-trip finishes.
    drop(listener);

    let state = vault.pending().begin(provider_id, session_id, nonce, pkce.clone());

    let redirect_uri = format!("http://127.0.0.1:{port}{}", endpoints.callback_path);

    let mut url = url::Url::parse(endpoints.authorize_url).map_err(|_| VaultError::UnsupportedDialect(dialect_name(dialect)))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", client_id);
        query.append_pair("redirect_uri", &redirect_uri);
        query.append_pair("scope", endpoints.scopes);
        query.append_pair("state", &state);

        if let Some(pkce) = &pkce {
            query.append_pair("code_challenge", &pkce.challenge);
            query.append_pair("code_challenge_method", "S256");
        }
    }

    vault.mark_authorizing(provider_id).await;

    Ok(AuthCodeAttempt {
        authorize_url: url.to_string(),
        state,
        callback_port: port,
    })
}

/// Bind the callback listener and block until the browser redirects back, then
/// exchange the authorization code for a credential and store it.
pub async fn complete_auth_code(
    vault: &Vault,
    dialect: config::Dialect,
    client_id: &str,
    client_secret: Option<&str>,
) -> Result<(), VaultError> {
    let endpoints = registry(dialect).ok_or(VaultError::UnsupportedDialect(dialect_name(dialect)))?;
    let (listener, port) = crate::callback::bind(&endpoints).await?;

    let query = crate::callback::accept_one(&listener, endpoints.callback_path)
        .await
        .map_err(|e| VaultError::RefreshFailed(Uuid::nil(), e.to_string()))?;

    let params: std::collections::HashMap<_, _> = url::form_urlencoded::parse(query.as_bytes()).collect();

    let state_key = params.get("state").ok_or(VaultError::UnknownState)?;
    let code = params.get("code").ok_or(VaultError::UnknownState)?;

    let entry = vault.pending().consume(state_key)?;

    let redirect_uri = format!("http://127.0.0.1:{port}{}", endpoints.callback_path);
    let creds = ClientCredentials { client_id, client_secret };

    let record = refresh::exchange_code(
        vault.http(),
        &endpoints,
        &creds,
        entry.provider_id,
        code,
        &redirect_uri,
        entry.pkce.as_ref().map(|p| p.verifier.as_str()),
    )
    .await?;

    vault.store_issued(record).await
}

/// Initiate a device-code flow, returning the user code and verification URL to
/// display, and polling the token endpoint until the user completes it.
pub async fn run_device_code(
    vault: &Vault,
    provider_id: Uuid,
    dialect: config::Dialect,
    client_id: &str,
    client_secret: Option<&str>,
    display: impl Fn(&str, &str),
) -> Result<(), VaultError> {
    let endpoints = registry(dialect).ok_or(VaultError::UnsupportedDialect(dialect_name(dialect)))?;

    let OAuthFlow::DeviceCode { pkce: use_pkce } = endpoints.flow else {
        return Err(VaultError::UnsupportedDialect(dialect_name(dialect)));
    };

    let pkce = use_pkce.then(PkcePair::generate);

    #[derive(serde::Deserialize)]
    struct DeviceAuthResponse {
        device_code: String,
        user_code: String,
        verification_uri: String,
        #[serde(default = "default_interval")]
        interval: u64,
    }

    fn default_interval() -> u64 {
        5
    }

    let mut form = vec![("client_id", client_id.to_string()), ("scope", endpoints.scopes.to_string())];

    if let Some(pkce) = &pkce {
        form.push(("code_challenge", pkce.challenge.clone()));
        form.push(("code_challenge_method", "S256".to_string()));
    }

    vault.mark_authorizing(provider_id).await;

    let response: DeviceAuthResponse = vault
        .http()
        .post(endpoints.device_authorize_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?
        .json()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    display(&response.user_code, &response.verification_uri);

    let creds = ClientCredentials { client_id, client_secret };
    let mut interval = std::time::Duration::from_secs(response.interval);

    loop {
        tokio::time::sleep(interval).await;

        match refresh::poll_device_code(
            vault.http(),
            &endpoints,
            &creds,
            provider_id,
            &response.device_code,
            pkce.as_ref().map(|p| p.verifier.as_str()),
        )
        .await?
        {
            DevicePollOutcome::Pending => continue,
            DevicePollOutcome::SlowDown => {
                interval += std::time::Duration::from_secs(5);
            }
            DevicePollOutcome::Denied => return Err(VaultError::ReauthorizationRequired(provider_id)),
            DevicePollOutcome::Issued(record) => return vault.store_issued(record).await,
        }
    }
}

fn dialect_name(dialect: config::Dialect) -> &'static str {
    match dialect {
        config::Dialect::Openai => "openai",
        config::Dialect::Anthropic => "anthropic",
        config::Dialect::Google => "google",
    }
}
