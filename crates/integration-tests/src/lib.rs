//! Shared harness for end-to-end tests: assembles the same router
//! `server::serve` would mount, backed by in-memory/temp-file stores and a mock
//! upstream, then drives it directly with [`tower::ServiceExt::oneshot`].

use axum::{Router, body::Body, http::Request};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A running test instance: the assembled router plus the pieces a test needs to
/// poke at directly (the rotation store path, for restart-persistence scenarios, and
/// the usage recorder's task handle, to force a flush before reading records back).
pub struct TestApp {
    pub router: Router,
    pub shutdown: CancellationToken,
    pub rotation_db: tempfile::TempPath,
    pub usage_db: tempfile::TempPath,
    pub usage_handle: tokio::task::JoinHandle<()>,
}

/// Bearer token every test config authenticates requests with.
pub const MODEL_TOKEN: &str = "test-model-token";
/// Bearer token every test config maps to `AuthMode::DryRun`.
pub const VIRTUAL_MODEL_TOKEN: &str = "test-virtual-token";

/// Builds a one-provider, one-rule config pointed at `upstream_base_url`, with the
/// given `dialect`/`tactic`/`services` JSON fragments spliced in. `config_json` is a
/// `serde_json::json!` value matching `config::Config`'s deserialized shape.
pub async fn spawn_app(config_json: Value) -> anyhow::Result<TestApp> {
    let rotation_db = tempfile::NamedTempFile::new()?.into_temp_path();
    let usage_db = tempfile::NamedTempFile::new()?.into_temp_path();

    let shutdown = CancellationToken::new();
    let (router, usage_handle) = build_router(config_json, &rotation_db, &usage_db, shutdown.clone()).await?;

    Ok(TestApp {
        router,
        shutdown,
        rotation_db,
        usage_db,
        usage_handle,
    })
}

/// Simulates a process restart: assembles a brand new router from scratch against the
/// same rotation/usage database files, with fresh in-memory balancer and vault state,
/// the way a freshly exec'd `tingly` binary would. Takes over `shutdown` from the
/// caller so the new recorder drain task can be flushed independently of the original.
pub async fn restart_app(app: &TestApp, config_json: Value) -> anyhow::Result<(Router, CancellationToken, tokio::task::JoinHandle<()>)> {
    let shutdown = CancellationToken::new();
    let (router, usage_handle) = build_router(config_json, &app.rotation_db, &app.usage_db, shutdown.clone()).await?;
    Ok((router, shutdown, usage_handle))
}

async fn build_router(
    config_json: Value,
    rotation_db: &std::path::Path,
    usage_db: &std::path::Path,
    shutdown: CancellationToken,
) -> anyhow::Result<(Router, tokio::task::JoinHandle<()>)> {
    let mut config: config::Config = serde_json::from_value(config_json)?;
    config.validate()?;

    let rotation_store = routing::SqliteRotationStore::open(rotation_db)?;
    let usage_store = usage::UsageStore::open(usage_db)?;

    let (recorder, usage_handle) = usage::spawn(usage_store, shutdown.clone());

    let vault_store = vault::CredentialStore::in_memory()?;
    let vault = vault::Vault::new(reqwest::Client::new(), vault_store);

    let router = llm::router(config, vault, recorder, rotation_store, shutdown.clone());

    Ok((router, usage_handle))
}

/// One row of the `usage_records` table, read back directly from the SQLite file
/// (bypassing the `usage` crate's own API, which only writes).
#[derive(Debug)]
pub struct UsageRow {
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub status_code: i64,
    pub streamed: bool,
    pub error_kind: Option<String>,
}

/// Cancels `shutdown` (forcing the recorder's drain loop to flush and exit), awaits
/// its task handle, then reads every row back from `usage_db` directly.
///
/// Only call this once per `(shutdown, usage_handle)` pair, and only after every
/// request that should be recorded has completed: cancelling `shutdown` also cancels
/// every in-flight request's [`context::RequestContext::cancellation`] child token.
pub async fn flush_and_read_usage(
    shutdown: CancellationToken,
    usage_handle: tokio::task::JoinHandle<()>,
    usage_db: &std::path::Path,
) -> anyhow::Result<Vec<UsageRow>> {
    shutdown.cancel();
    usage_handle.await?;

    let path = usage_db.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<UsageRow>> {
        let conn = rusqlite::Connection::open(path)?;
        let mut statement = conn.prepare(
            "SELECT model, input_tokens, output_tokens, status_code, streamed, error_kind
             FROM usage_records ORDER BY id",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok(UsageRow {
                    model: row.get(0)?,
                    input_tokens: row.get(1)?,
                    output_tokens: row.get(2)?,
                    status_code: row.get(3)?,
                    streamed: row.get::<_, i64>(4)? != 0,
                    error_kind: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await??;

    Ok(rows)
}

/// Sends `body` as a JSON POST to `path` with the given bearer token, and returns
/// the decoded JSON response body alongside the status code.
pub async fn post_json(router: &Router, path: &str, token: &str, body: Value) -> anyhow::Result<(u16, Value)> {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?;

    let response = router.clone().oneshot(request).await?;
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, json))
}

/// Sends `body` and returns the raw response, for tests that need to inspect
/// streaming (SSE) bodies or non-JSON error shapes directly.
pub async fn post_raw(router: &Router, path: &str, token: &str, body: Value) -> anyhow::Result<axum::response::Response> {
    use tower::ServiceExt;

    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?;

    Ok(router.clone().oneshot(request).await?)
}
