//! The loopback HTTP callback used by the authorization-code flows.
//!
//! Providers redirect the user's browser to a fixed path on `localhost`; we don't need
//! a full HTTP server for that, just enough to read one request line and answer with a
//! page telling the user they can close the tab.

use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    time::timeout,
};

use crate::{error::VaultError, flow::OAuthEndpoints};

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Bind the first available port from [`OAuthEndpoints::callback_ports`], in order.
pub async fn bind(endpoints: &OAuthEndpoints) -> Result<(TcpListener, u16), VaultError> {
    for &port in endpoints.callback_ports {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => log::debug!("callback port {port} unavailable: {e}"),
        }
    }

    Err(VaultError::NoCallbackPort)
}

/// Accept exactly one connection, parse the GET request line's query string, and reply
/// with a minimal HTML page. Returns the raw query string (e.g. `code=...&state=...`).
pub async fn accept_one(listener: &TcpListener, callback_path: &str) -> anyhow::Result<String> {
    let (mut stream, _) = timeout(ACCEPT_TIMEOUT, listener.accept()).await??;

    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain remaining headers so the client doesn't see a broken pipe on reply.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" {
            break;
        }
    }

    let path_and_query = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("malformed callback request line: {request_line:?}"))?;

    let query = path_and_query
        .strip_prefix(callback_path)
        .and_then(|rest| rest.strip_prefix('?'))
        .unwrap_or_default()
        .to_string();

    let body = "<html><body>Authorization complete, you can close this tab.</body></html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    Ok(query)
}
