//! Errors raised by the usage recorder.

/// Failure modes from the persistence sink. Never surfaced to the request pipeline —
/// `Recorder::record` cannot fail from the caller's point of view (non-blocking,
/// overflow drops) — only logged by the drain loop.
#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    /// Underlying persistence failure (SQLite).
    #[error("usage store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// Connection pool failure.
    #[error("usage store pool error: {0}")]
    Pool(#[from] r2d2::Error),
}
