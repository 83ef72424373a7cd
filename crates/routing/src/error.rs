//! Errors raised by the load balancer.

/// Failure modes surfaced to the request pipeline.
#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    /// A Rule's service list has no currently-active entries.
    #[error("rule '{0}' has no active services")]
    NoActiveServices(uuid::Uuid),
    /// Underlying rotation-store persistence failure (SQLite).
    #[error("rotation store error: {0}")]
    Store(#[from] rusqlite::Error),
    /// Connection pool failure.
    #[error("rotation store pool error: {0}")]
    Pool(#[from] r2d2::Error),
}
