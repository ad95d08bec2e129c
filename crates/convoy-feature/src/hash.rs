//! Config-change hashing
//!
//! A feature's custom configuration is reduced to a canonical JSON document
//! (object keys sorted at every depth) and digested with MD5. The digest only
//! has to detect changes in operator-supplied, non-adversarial input, so a
//! non collision-hardened algorithm is acceptable and kept on purpose: the
//! annotation values it produces must stay stable across upgrades.

use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use tracing::warn;

use convoy_common::crd::CustomConfig;
use convoy_common::yaml::parse_yaml;

/// Hex MD5 digest of a custom configuration, `None` when nothing is configured.
///
/// Inline `config_data` is parsed as YAML so that formatting and key order do
/// not affect the digest; unparseable data is hashed as the raw string. A
/// ConfigMap reference contributes its projected items but not its name, so
/// the same content served from a renamed ConfigMap keeps its digest.
pub fn config_hash(feature_id: &str, config: Option<&CustomConfig>) -> Option<String> {
    let config = config.filter(|c| !c.is_empty())?;

    let payload = if let Some(data) = config.config_data.as_deref() {
        let content = match parse_yaml(data) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    feature = %feature_id,
                    %error,
                    "custom config is not valid YAML, hashing raw data"
                );
                Value::String(data.to_string())
            }
        };
        json!({ "configData": content })
    } else {
        let items: Vec<Value> = config
            .config_map
            .iter()
            .flat_map(|cm| cm.items.iter())
            .map(|item| json!({ "key": item.key, "path": item.path }))
            .collect();
        json!({ "configMap": { "items": items } })
    };

    Some(digest_value(&payload))
}

/// Hex MD5 digest of a JSON value in canonical form
pub fn digest_value(value: &Value) -> String {
    let canonical = canonicalize(value).to_string();
    let digest = Md5::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Rebuild a value with object keys sorted at every depth
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_common::crd::{ConfigMapConfig, ConfigMapItem};

    fn inline(data: &str) -> CustomConfig {
        CustomConfig {
            config_data: Some(data.to_string()),
            config_map: None,
        }
    }

    fn referenced(name: &str, keys: &[&str]) -> CustomConfig {
        CustomConfig {
            config_data: None,
            config_map: Some(ConfigMapConfig {
                name: name.to_string(),
                items: keys
                    .iter()
                    .map(|k| ConfigMapItem {
                        key: k.to_string(),
                        path: k.to_string(),
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn missing_or_empty_config_has_no_hash() {
        assert_eq!(config_hash("ksm", None), None);
        assert_eq!(config_hash("ksm", Some(&CustomConfig::default())), None);
    }

    #[test]
    fn key_order_does_not_change_digest() {
        let a = config_hash("ksm", Some(&inline("collectors:\n  - pods\ntelemetry: true\n")));
        let b = config_hash("ksm", Some(&inline("telemetry: true\ncollectors: [pods]\n")));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn content_change_changes_digest() {
        let a = config_hash("ksm", Some(&inline("telemetry: true")));
        let b = config_hash("ksm", Some(&inline("telemetry: false")));
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_lowercase_hex_md5() {
        let hash = config_hash("ksm", Some(&inline("a: 1"))).expect("hash");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn known_digest_of_canonical_payload() {
        let expected = digest_value(&json!({ "configData": { "a": 1 } }));
        assert_eq!(config_hash("ksm", Some(&inline("a: 1"))), Some(expected));
        assert_eq!(
            digest_value(&Value::String(String::new())),
            format!("{:x}", Md5::digest(b"\"\""))
        );
    }

    #[test]
    fn renamed_config_map_keeps_digest() {
        let a = config_hash("ksm", Some(&referenced("ksm-v1", &["conf.yaml"])));
        let b = config_hash("ksm", Some(&referenced("ksm-v2", &["conf.yaml"])));
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, config_hash("ksm", Some(&referenced("ksm-v1", &["other.yaml"]))));
    }

    #[test]
    fn invalid_yaml_falls_back_to_raw_string() {
        let raw = "key: [unterminated";
        let hash = config_hash("ksm", Some(&inline(raw)));
        assert_eq!(hash, Some(digest_value(&json!({ "configData": raw }))));
    }

    #[test]
    fn canonicalize_sorts_nested_keys() {
        let value = json!({ "b": { "z": 1, "y": [ { "d": 1, "c": 2 } ] }, "a": null });
        assert_eq!(
            canonicalize(&value).to_string(),
            r#"{"a":null,"b":{"y":[{"c":2,"d":1}],"z":1}}"#
        );
    }
}
