//! The load balancer: given a Rule's active Services, pick exactly one per
//! call and advance the tactic's rotation state.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use config::{Rule, Tactic};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::RoutingError;
use crate::stats::{ServiceStats, ServiceStatsSnapshot};
use crate::store::RotationStore;

/// The Service chosen for one request, along with enough to record the outcome later.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The rule this selection was made for.
    pub rule_id: Uuid,
    /// Index into `rule.active_services()` (not `rule.services`) of the chosen service.
    pub active_index: usize,
    /// The chosen service's provider id.
    pub provider_id: Uuid,
    /// The chosen service's concrete upstream model name.
    pub model: String,
}

struct RotationState {
    index: usize,
    requests_since_rotation: u32,
    tokens_since_rotation: u64,
}

/// Per-Rule rotation state plus cross-rule Service observability counters.
///
/// One mutex per rule serializes index read, selection, and advancement exactly as
/// requires; Service counters are separate atomics so a stats read never blocks
/// on the rotation mutex (: "a read that observes a stale counter still yields a
/// safe, possibly suboptimal pick").
pub struct LoadBalancer<S> {
    store: S,
    rotations: DashMap<Uuid, Arc<StdMutex<RotationState>>>,
    stats: DashMap<(Uuid, usize), Arc<ServiceStats>>,
}

impl<S: RotationStore> LoadBalancer<S> {
    /// Construct a balancer backed by `store` for durable rotation indices.
    pub fn new(store: S) -> Self {
        Self {
            store,
            rotations: DashMap::new(),
            stats: DashMap::new(),
        }
    }

    fn rotation(&self, rule: &Rule) -> Result<Arc<StdMutex<RotationState>>, RoutingError> {
        if let Some(existing) = self.rotations.get(&rule.id) {
            return Ok(existing.clone());
        }

        let index = self.store.current_index(rule.id)?.unwrap_or(0) as usize;

        let state = Arc::new(StdMutex::new(RotationState {
            index,
            requests_since_rotation: 0,
            tokens_since_rotation: 0,
        }));

        Ok(self.rotations.entry(rule.id).or_insert(state).clone())
    }

    /// Pick exactly one active Service for `rule`.
    pub fn select(&self, rule: &Rule) -> Result<Selection, RoutingError> {
        let active: Vec<_> = rule.active_services().collect();

        if active.is_empty() {
            return Err(RoutingError::NoActiveServices(rule.id));
        }

        let active_index = if matches!(rule.tactic, Tactic::Random {}) {
            use rand::Rng;
            rand::rng().random_range(0..active.len())
        } else {
            let rotation = self.rotation(rule)?;
            let guard = rotation.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.index % active.len()
        };

        let service = active[active_index];

        Ok(Selection {
            rule_id: rule.id,
            active_index,
            provider_id: service.provider_id,
            model: service.model.clone(),
        })
    }

    /// Record the outcome of a dispatch made from `selection`, advancing the tactic
    /// and durably persisting the new index if advancement occurred.
    ///
    /// Called after the response has been recorded, never before dispatch, so
    /// a failing service does not consume its turn: on `success = false` this updates
    /// only the observability counters, never the rotation state.
    pub fn record_outcome(&self, rule: &Rule, selection: &Selection, output_tokens: u64, success: bool) -> Result<(), RoutingError> {
        let stats = self
            .stats
            .entry((rule.id, selection.active_index))
            .or_insert_with(|| Arc::new(ServiceStats::default()))
            .clone();

        if success {
            stats.record_success(output_tokens);
        } else {
            stats.record_error();
            return Ok(());
        }

        if matches!(rule.tactic, Tactic::Random {}) {
            return Ok(());
        }

        let active_len = rule.active_services().count();
        if active_len == 0 {
            return Ok(());
        }

        let rotation = self.rotation(rule)?;
        let new_index = {
            let mut guard = rotation.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            guard.requests_since_rotation += 1;
            guard.tokens_since_rotation += output_tokens;

            let should_rotate = match &rule.tactic {
                Tactic::RoundRobin { request_threshold } => guard.requests_since_rotation >= *request_threshold,
                Tactic::TokenBased { token_threshold } => guard.tokens_since_rotation >= *token_threshold,
                Tactic::Hybrid {
                    request_threshold,
                    token_threshold,
                } => guard.requests_since_rotation >= *request_threshold || guard.tokens_since_rotation >= *token_threshold,
                Tactic::Random {} => false,
            };

            if !should_rotate {
                return Ok(());
            }

            guard.index = (guard.index % active_len + 1) % active_len;
            guard.requests_since_rotation = 0;
            guard.tokens_since_rotation = 0;
            guard.index
        };

        self.store.set_current_index(rule.id, new_index as u32)
    }

    /// Read the current observability counters for one Service, if it has ever served
    /// a request since this process started.
    pub fn service_stats(&self, rule_id: Uuid, active_index: usize) -> Option<ServiceStatsSnapshot> {
        self.stats.get(&(rule_id, active_index)).map(|entry| entry.snapshot())
    }
}
