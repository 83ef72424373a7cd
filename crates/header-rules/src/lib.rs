//! Applies declarative [`config::HeaderRule`] transforms to outbound provider requests.

use config::{HeaderRule, NameOrPattern};
use reqwest::{
    RequestBuilder,
    header::{HeaderMap, HeaderName, HeaderValue},
};

/// Apply every rule in `rules`, in order, to `builder`. `incoming` is the client's
/// original request headers, the source for `Forward`/`RenameDuplicate` rules.
pub fn apply(builder: RequestBuilder, rules: &[HeaderRule], incoming: &HeaderMap) -> RequestBuilder {
    rules.iter().fold(builder, |builder, rule| apply_one(builder, rule, incoming))
}

fn apply_one(builder: RequestBuilder, rule: &HeaderRule, incoming: &HeaderMap) -> RequestBuilder {
    match rule {
        HeaderRule::Forward(forward) => {
            let found = incoming
                .iter()
                .find(|(name, _)| forward.name.matches(name.as_str()))
                .map(|(_, value)| value.clone());

            let Some(value) = found.or_else(|| forward.default.as_deref().and_then(to_header_value)) else {
                return builder;
            };

            let Some(name) = forward
                .rename
                .as_deref()
                .or_else(|| match &forward.name {
                    NameOrPattern::Name(name) => Some(name.as_str()),
                    NameOrPattern::Pattern(_) => None,
                })
                .and_then(to_header_name)
            else {
                return builder;
            };

            builder.header(name, value)
        }
        HeaderRule::Insert(insert) => match (to_header_name(&insert.name), to_header_value(insert.value.as_str())) {
            (Some(name), Some(value)) => builder.header(name, value),
            _ => builder,
        },
        HeaderRule::Remove(_) => {
            // Removal only affects headers we would otherwise forward; since we build the
            // outbound request from scratch there is nothing already present to strip.
            builder
        }
        HeaderRule::RenameDuplicate(duplicate) => {
            let Some(value) = incoming.get(duplicate.name.as_str()).cloned() else {
                return builder;
            };

            match to_header_name(&duplicate.rename) {
                Some(name) => builder.header(name, value),
                None => builder,
            }
        }
    }
}

fn to_header_name(name: &str) -> Option<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).ok()
}

fn to_header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;

    fn client() -> Client {
        Client::new()
    }

    #[test]
    fn insert_adds_fixed_header() {
        let rules = vec![HeaderRule::Insert(config_insert("x-provider", "static-value"))];
        let incoming = HeaderMap::new();

        let request = apply(client().get("http://localhost"), &rules, &incoming)
            .build()
            .unwrap();

        assert_eq!(request.headers().get("x-provider").unwrap(), "static-value");
    }

    fn config_insert(name: &str, value: &str) -> config::HeaderInsert {
        serde_json::from_value(serde_json::json!({ "name": name, "value": value })).unwrap()
    }
}
