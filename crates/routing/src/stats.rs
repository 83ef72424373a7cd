//! Runtime counters carried by a Service: request count, token count, error
//! count, last-used timestamp. Purely observational — never persisted, never consulted
//! by tactic advancement (that's [`crate::balancer`]'s own rotation-local counters).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use jiff::Timestamp;

/// Atomic counters for one (rule, service-index) pair.
#[derive(Debug, Default)]
pub struct ServiceStats {
    requests: AtomicU64,
    tokens: AtomicU64,
    errors: AtomicU64,
    last_used_epoch_ms: AtomicI64,
}

/// A point-in-time read of [`ServiceStats`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceStatsSnapshot {
    /// Total requests dispatched to this service.
    pub requests: u64,
    /// Total output tokens attributed to this service.
    pub tokens: u64,
    /// Total dispatch/upstream errors attributed to this service.
    pub errors: u64,
    /// Last time this service was selected, if ever.
    pub last_used: Option<Timestamp>,
}

impl ServiceStats {
    /// Record one successful dispatch, adding `output_tokens` to the running total.
    pub fn record_success(&self, output_tokens: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.tokens.fetch_add(output_tokens, Ordering::Relaxed);
        self.touch();
    }

    /// Record one failed dispatch.
    pub fn record_error(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    fn touch(&self) {
        self.last_used_epoch_ms.store(Timestamp::now().as_millisecond(), Ordering::Relaxed);
    }

    /// Read the current counters. A reader racing a concurrent update sees a safe,
    /// possibly-stale snapshot.
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        let epoch_ms = self.last_used_epoch_ms.load(Ordering::Relaxed);

        ServiceStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            tokens: self.tokens.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_used: (epoch_ms != 0).then(|| Timestamp::from_millisecond(epoch_ms).unwrap_or(Timestamp::UNIX_EPOCH)),
        }
    }
}
