use std::{sync::OnceLock, time::Duration};

use axum::http;
use config::Provider;
use dashmap::DashMap;
use reqwest::Client;
use uuid::Uuid;

pub(crate) fn default_http_client_builder() -> reqwest::ClientBuilder {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(Duration::from_secs(60))
        // Hyper connection pool only exposes two parameters max idle connections per host
        // and idle connection timeout. There is not TTL on the connections themselves to
        // force a refresh, necessary if the DNS changes its records. Somehow, even within
        // a benchmark ramping *up* traffic, we do pick up DNS changes by setting a pool
        // idle timeout of 5 seconds even though in theory no connection should be idle?
        // A bit confusing, and I suspect I don't fully understand how Hyper is managing
        // connections underneath. But seems like best choice we have right now, Grafbase
        // Gateway/Apollo Router use this same default value.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

/// Common HTTP client to re-use as much as possible the same connections.
pub(crate) fn http_client() -> reqwest::Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            default_http_client_builder()
                .build()
                .expect("Failed to build default HTTP client")
        })
        .clone()
}

/// A client honoring one provider's configured timeout and outbound proxy, built once
/// and cached for the life of the process since `reqwest::Client` is itself a pool handle.
pub(crate) fn client_for_provider(provider: &Provider) -> reqwest::Client {
    static CLIENTS: OnceLock<DashMap<Uuid, Client>> = OnceLock::new();
    let clients = CLIENTS.get_or_init(DashMap::new);

    if let Some(existing) = clients.get(&provider.id) {
        return existing.clone();
    }

    let mut builder = default_http_client_builder().timeout(provider.timeout);

    if let Some(proxy_url) = &provider.proxy_url {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => log::warn!("provider '{}' has an invalid proxy_url, ignoring: {e}", provider.name),
        }
    }

    let client = builder.build().unwrap_or_else(|e| {
        log::error!("failed to build HTTP client for provider '{}': {e}, falling back to default", provider.name);
        http_client()
    });

    clients.insert(provider.id, client.clone());
    client
}
