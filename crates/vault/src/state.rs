//! The opaque `state` parameter carried through an authorization-code round trip.
//!
//! Entries expire after 10 minutes and are consumed (removed) on first lookup, so a
//! callback can never be replayed.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::{error::VaultError, pkce::PkcePair};

const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Everything the callback handler needs to finish an authorization attempt.
#[derive(Debug, Clone)]
pub struct StateEntry {
    /// The provider this authorization attempt targets.
    pub provider_id: Uuid,
    /// Opaque session id correlating this attempt to whoever initiated it.
    pub session_id: String,
    /// Anti-replay nonce, echoed and checked by callers that issued one.
    pub nonce: String,
    /// The PKCE pair generated at authorization start, if the flow uses PKCE.
    pub pkce: Option<PkcePair>,
    issued_at: Instant,
}

/// In-memory store for pending authorization attempts, keyed by the `state` value sent
/// to the provider's authorization endpoint.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: DashMap<String, StateEntry>,
}

impl StateStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a new authorization attempt, returning the `state` value to send.
    pub fn begin(&self, provider_id: Uuid, session_id: String, nonce: String, pkce: Option<PkcePair>) -> String {
        self.sweep_expired();

        let state = Uuid::new_v4().to_string();

        self.entries.insert(
            state.clone(),
            StateEntry {
                provider_id,
                session_id,
                nonce,
                pkce,
                issued_at: Instant::now(),
            },
        );

        state
    }

    /// Consume a `state` value from a callback, failing if it is unknown or expired.
    ///
    /// Single-use: the entry is removed whether or not it has expired.
    pub fn consume(&self, state: &str) -> Result<StateEntry, VaultError> {
        let (_, entry) = self.entries.remove(state).ok_or(VaultError::UnknownState)?;

        if entry.issued_at.elapsed() > STATE_TTL {
            return Err(VaultError::ExpiredState);
        }

        Ok(entry)
    }

    fn sweep_expired(&self) {
        self.entries.retain(|_, entry| entry.issued_at.elapsed() <= STATE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consuming_removes_the_entry() {
        let store = StateStore::new();
        let provider_id = Uuid::new_v4();
        let state = store.begin(provider_id, "session".into(), "nonce".into(), None);

        let entry = store.consume(&state).unwrap();
        assert_eq!(entry.provider_id, provider_id);

        assert!(matches!(store.consume(&state), Err(VaultError::UnknownState)));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let store = StateStore::new();
        assert!(matches!(store.consume("bogus"), Err(VaultError::UnknownState)));
    }
}
