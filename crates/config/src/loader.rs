use std::{collections::HashSet, path::Path};

use crate::{Config, error::Error};

pub(crate) fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path.as_ref()).map_err(Error::ConfigOpen)?;
    let mut value: serde_json::Value = serde_json::from_str(&raw).map_err(Error::ConfigParse)?;

    expand_dynamic_strings(&mut value, "$")?;

    let mut config: Config = serde_json::from_value(value).map_err(Error::ConfigParse)?;
    validate(&mut config)?;

    Ok(config)
}

/// Recursively expands `${ENV_VAR}` placeholders in every JSON string value.
fn expand_dynamic_strings(value: &mut serde_json::Value, path: &str) -> Result<(), Error> {
    match value {
        serde_json::Value::String(s) => {
            let expanded = serde_dynamic_string::expand(s).map_err(|reason| Error::EnvVarSubstitution {
                path: path.to_string(),
                reason,
            })?;

            *s = expanded;
        }
        serde_json::Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                expand_dynamic_strings(item, &format!("{path}[{index}]"))?;
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                expand_dynamic_strings(item, &format!("{path}.{key}"))?;
            }
        }
        _ => {}
    }

    Ok(())
}

/// Validates referential integrity and that the configuration is
/// functional. Dangling `Service::provider_id` references are pruned with a warning
/// rather than rejected, per the "never silently used" invariant: dropping the dangling
/// service outright satisfies that by construction.
pub(crate) fn validate(config: &mut Config) -> anyhow::Result<()> {
    if config.providers.is_empty() && config.rules.is_empty() {
        return Err(Error::NoDownstreams.into());
    }

    let known_providers: HashSet<_> = config.providers.iter().map(|provider| provider.id).collect();

    for rule in &mut config.rules {
        let rule_id = rule.id;

        rule.services.retain(|service| {
            let known = known_providers.contains(&service.provider_id);

            if !known {
                log::warn!(
                    "{}",
                    Error::DanglingProviderReference {
                        rule_id,
                        provider_id: service.provider_id,
                    }
                );
            }

            known
        });
    }

    let mut seen = std::collections::HashMap::new();

    for rule in &config.rules {
        let key = (rule.request_model.clone(), rule.scenario);

        if let Some(first) = seen.insert(key, rule.id) {
            return Err(Error::DuplicateRule {
                model: rule.request_model.clone(),
                scenario: rule.scenario.to_string(),
                first,
                second: rule.id,
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn rejects_empty_configuration() {
        let mut config: Config = serde_json::from_str("{}").unwrap();
        assert!(validate(&mut config).is_err());
    }

    #[test]
    fn expands_env_vars_in_strings() {
        temp_env::with_var("TINGLY_TEST_TOKEN", Some("shh"), || {
            let mut value: serde_json::Value = serde_json::from_str(indoc! {r#"
                {"auth": {"model_token": "${TINGLY_TEST_TOKEN}"}}
            "#})
            .unwrap();

            expand_dynamic_strings(&mut value, "$").unwrap();
            assert_eq!(value["auth"]["model_token"], "shh");
        });
    }
}
