//! Token-endpoint HTTP calls: refresh and the three authorization exchanges.

use jiff::{SignedDuration, Timestamp};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

use crate::{credential::CredentialRecord, error::VaultError, flow::OAuthEndpoints};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Client credentials resolved from `Provider::auth` with `OAUTH_CLIENT_ID`/
/// `OAUTH_CLIENT_SECRET` overrides already applied.
pub struct ClientCredentials<'a> {
    /// OAuth client id.
    pub client_id: &'a str,
    /// OAuth client secret, absent for public clients (PKCE/device flows).
    pub client_secret: Option<&'a str>,
}

/// Refresh an OAuth credential, enforcing the monotonic-expiry invariant.
pub async fn refresh(
    http: &reqwest::Client,
    endpoints: &OAuthEndpoints,
    client: &ClientCredentials<'_>,
    provider_id: Uuid,
    current: &CredentialRecord,
) -> Result<CredentialRecord, VaultError> {
    let Some(refresh_token) = &current.refresh_token else {
        return Err(VaultError::ReauthorizationRequired(provider_id));
    };

    let mut form = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.expose_secret().to_string()),
        ("client_id", client.client_id.to_string()),
    ];

    if let Some(secret) = client.client_secret {
        form.push(("client_secret", secret.to_string()));
    }

    let response = http
        .post(endpoints.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    let status = response.status();

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    if let Some(error) = &body.error {
        if error == "invalid_grant" {
            return Err(VaultError::ReauthorizationRequired(provider_id));
        }

        return Err(VaultError::RefreshFailed(
            provider_id,
            body.error_description.unwrap_or_else(|| error.clone()),
        ));
    }

    if !status.is_success() {
        return Err(VaultError::RefreshFailed(provider_id, format!("http {status}")));
    }

    let expiry = Timestamp::now() + SignedDuration::from_secs(body.expires_in.unwrap_or(3600) as i64);

    if expiry < current.expiry {
        return Err(VaultError::NonMonotonicExpiry(provider_id));
    }

    Ok(CredentialRecord {
        provider_id,
        access_token: SecretString::from(body.access_token),
        refresh_token: body.refresh_token.map(SecretString::from).or_else(|| current.refresh_token.clone()),
        id_token: body.id_token.map(SecretString::from).or_else(|| current.id_token.clone()),
        expiry,
        token_type: body.token_type,
        resource_url: current.resource_url.clone(),
        provider_metadata: current.provider_metadata.clone(),
    })
}

/// Exchange an authorization code (optionally with a PKCE verifier) for a credential.
pub async fn exchange_code(
    http: &reqwest::Client,
    endpoints: &OAuthEndpoints,
    client: &ClientCredentials<'_>,
    provider_id: Uuid,
    code: &str,
    redirect_uri: &str,
    pkce_verifier: Option<&str>,
) -> Result<CredentialRecord, VaultError> {
    let mut form = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
        ("client_id", client.client_id.to_string()),
    ];

    if let Some(secret) = client.client_secret {
        form.push(("client_secret", secret.to_string()));
    }

    if let Some(verifier) = pkce_verifier {
        form.push(("code_verifier", verifier.to_string()));
    }

    exchange(http, endpoints.token_url, &form, provider_id).await
}

/// Poll the token endpoint once for a device-code grant (RFC 8628 §3.4).
///
/// Callers loop this on the server-advertised interval until it returns something other
/// than `authorization_pending`.
pub async fn poll_device_code(
    http: &reqwest::Client,
    endpoints: &OAuthEndpoints,
    client: &ClientCredentials<'_>,
    provider_id: Uuid,
    device_code: &str,
    pkce_verifier: Option<&str>,
) -> Result<DevicePollOutcome, VaultError> {
    let mut form = vec![
        ("grant_type", "urn:ietf:params:oauth:grant-type:device_code".to_string()),
        ("device_code", device_code.to_string()),
        ("client_id", client.client_id.to_string()),
    ];

    if let Some(secret) = client.client_secret {
        form.push(("client_secret", secret.to_string()));
    }

    if let Some(verifier) = pkce_verifier {
        form.push(("code_verifier", verifier.to_string()));
    }

    let response = http
        .post(endpoints.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    if let Some(error) = &body.error {
        return Ok(match error.as_str() {
            "authorization_pending" => DevicePollOutcome::Pending,
            "slow_down" => DevicePollOutcome::SlowDown,
            "expired_token" | "access_denied" => DevicePollOutcome::Denied,
            _ => {
                return Err(VaultError::RefreshFailed(
                    provider_id,
                    body.error_description.unwrap_or_else(|| error.clone()),
                ));
            }
        });
    }

    let expiry = Timestamp::now() + SignedDuration::from_secs(body.expires_in.unwrap_or(3600) as i64);

    Ok(DevicePollOutcome::Issued(CredentialRecord {
        provider_id,
        access_token: SecretString::from(body.access_token),
        refresh_token: body.refresh_token.map(SecretString::from),
        id_token: body.id_token.map(SecretString::from),
        expiry,
        token_type: body.token_type,
        resource_url: None,
        provider_metadata: serde_json::Value::Null,
    }))
}

/// Result of one device-code poll.
pub enum DevicePollOutcome {
    /// The user hasn't completed the flow yet; poll again after the interval.
    Pending,
    /// The server asked for a longer polling interval.
    SlowDown,
    /// The user denied consent or the device code expired.
    Denied,
    /// Authorization complete.
    Issued(CredentialRecord),
}

async fn exchange(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, String)],
    provider_id: Uuid,
) -> Result<CredentialRecord, VaultError> {
    let response = http
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    let status = response.status();

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| VaultError::RefreshFailed(provider_id, e.to_string()))?;

    if let Some(error) = &body.error {
        return Err(VaultError::RefreshFailed(
            provider_id,
            body.error_description.unwrap_or_else(|| error.clone()),
        ));
    }

    if !status.is_success() {
        return Err(VaultError::RefreshFailed(provider_id, format!("http {status}")));
    }

    let expiry = Timestamp::now() + SignedDuration::from_secs(body.expires_in.unwrap_or(3600) as i64);

    Ok(CredentialRecord {
        provider_id,
        access_token: SecretString::from(body.access_token),
        refresh_token: body.refresh_token.map(SecretString::from),
        id_token: body.id_token.map(SecretString::from),
        expiry,
        token_type: body.token_type,
        resource_url: None,
        provider_metadata: serde_json::Value::Null,
    })
}
