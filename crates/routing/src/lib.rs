//! Rule resolver glue and the load balancer.
//!
//! Rule resolution itself (`Config::resolve_rule`) already lives in `config`, a plain
//! linear scan with no state to own. What this crate owns is the stateful half: given
//! a resolved Rule, pick one Service under its tactic and durably track rotation.

#![deny(missing_docs)]

mod balancer;
pub mod error;
mod stats;
pub mod store;

pub use balancer::{LoadBalancer, Selection};
pub use stats::{ServiceStats, ServiceStatsSnapshot};
pub use store::{InMemoryRotationStore, RotationStore, SqliteRotationStore};

#[cfg(test)]
mod tests {
    use config::{Rule, Scenario, Service, Tactic};
    use uuid::Uuid;

    use super::*;

    fn rule_with(tactic: Tactic, service_count: usize) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            request_model: "tingly-test".to_string(),
            response_model: None,
            scenario: Scenario::Openai,
            services: (0..service_count)
                .map(|i| Service {
                    provider_id: Uuid::new_v4(),
                    model: format!("model-{i}"),
                    weight: 1,
                    active: true,
                })
                .collect(),
            tactic,
            active: true,
        }
    }

    #[test]
    fn round_robin_with_threshold_one_cycles_in_order() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(Tactic::RoundRobin { request_threshold: 1 }, 3);

        let mut seen = Vec::new();
        for _ in 0..9 {
            let selection = balancer.select(&rule).unwrap();
            seen.push(selection.model.clone());
            balancer.record_outcome(&rule, &selection, 10, true).unwrap();
        }

        assert_eq!(
            seen,
            vec![
                "model-0", "model-1", "model-2", "model-0", "model-1", "model-2", "model-0", "model-1", "model-2",
            ]
        );
    }

    #[test]
    fn round_robin_with_threshold_n_holds_for_n_calls() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(Tactic::RoundRobin { request_threshold: 3 }, 2);

        let mut seen = Vec::new();
        for _ in 0..6 {
            let selection = balancer.select(&rule).unwrap();
            seen.push(selection.model.clone());
            balancer.record_outcome(&rule, &selection, 0, true).unwrap();
        }

        assert_eq!(seen, vec!["model-0", "model-0", "model-0", "model-1", "model-1", "model-1"]);
    }

    #[test]
    fn token_based_rotates_on_accumulated_output_tokens() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(Tactic::TokenBased { token_threshold: 100 }, 2);

        let mut seen = Vec::new();
        for tokens in [40, 40, 40, 10, 10] {
            let selection = balancer.select(&rule).unwrap();
            seen.push(selection.model.clone());
            balancer.record_outcome(&rule, &selection, tokens, true).unwrap();
        }

        // 40+40+40 = 120 >= 100 rotates after the third call.
        assert_eq!(seen, vec!["model-0", "model-0", "model-0", "model-1", "model-1"]);
    }

    #[test]
    fn hybrid_rotates_on_whichever_threshold_is_hit_first() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(
            Tactic::Hybrid {
                request_threshold: 5,
                token_threshold: 50,
            },
            2,
        );

        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-0");
        balancer.record_outcome(&rule, &selection, 60, true).unwrap();

        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-1");
    }

    #[test]
    fn failed_dispatch_does_not_consume_the_services_turn() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(Tactic::RoundRobin { request_threshold: 1 }, 2);

        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-0");
        balancer.record_outcome(&rule, &selection, 0, false).unwrap();

        // Still model-0: the failed call never advanced rotation.
        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-0");

        let stats = balancer.service_stats(rule.id, 0).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.requests, 1);
    }

    #[test]
    fn random_visits_every_active_service_eventually() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let rule = rule_with(Tactic::Random {}, 4);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let selection = balancer.select(&rule).unwrap();
            seen.insert(selection.model.clone());
            balancer.record_outcome(&rule, &selection, 1, true).unwrap();
        }

        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn every_tactic_selects_only_active_services_liveness() {
        for tactic in [
            Tactic::RoundRobin { request_threshold: 1 },
            Tactic::TokenBased { token_threshold: 5 },
            Tactic::Hybrid {
                request_threshold: 2,
                token_threshold: 5,
            },
            Tactic::Random {},
        ] {
            let balancer = LoadBalancer::new(InMemoryRotationStore::new());
            let rule = rule_with(tactic, 3);
            let expected: std::collections::HashSet<_> = rule.services.iter().map(|s| s.model.clone()).collect();

            let mut seen = std::collections::HashSet::new();
            for _ in 0..60 {
                let selection = balancer.select(&rule).unwrap();
                seen.insert(selection.model.clone());
                balancer.record_outcome(&rule, &selection, 3, true).unwrap();
            }

            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn no_active_services_is_an_error() {
        let mut rule = rule_with(Tactic::RoundRobin { request_threshold: 1 }, 2);
        for service in &mut rule.services {
            service.active = false;
        }

        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        assert!(balancer.select(&rule).is_err());
    }

    #[test]
    fn rotation_survives_a_fresh_balancer_over_the_same_store() {
        let store = SqliteRotationStore::in_memory().unwrap();
        let rule = rule_with(Tactic::RoundRobin { request_threshold: 1 }, 3);

        {
            let balancer = LoadBalancer::new(store.clone());
            for _ in 0..2 {
                let selection = balancer.select(&rule).unwrap();
                balancer.record_outcome(&rule, &selection, 0, true).unwrap();
            }
        }

        // A brand new balancer over the same durable store resumes mid-rotation.
        let balancer = LoadBalancer::new(store);
        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-2");
    }

    #[test]
    fn shrinking_active_services_reduces_a_stale_index_modulo_new_length() {
        let balancer = LoadBalancer::new(InMemoryRotationStore::new());
        let mut rule = rule_with(Tactic::RoundRobin { request_threshold: 1 }, 3);

        for _ in 0..2 {
            let selection = balancer.select(&rule).unwrap();
            balancer.record_outcome(&rule, &selection, 0, true).unwrap();
        }

        // Index is now 2 (model-2). Drop to two services; the stale index must reduce
        // modulo the new length rather than panic or go out of bounds.
        rule.services.truncate(2);

        let selection = balancer.select(&rule).unwrap();
        assert_eq!(selection.model, "model-0");
    }
}
