//! # Payload Redaction
//!
//! Field-name based, unconditional, and applied before an entry reaches the
//! sink. A key is sensitive when it equals one of [`SENSITIVE_KEYS`]
//! ignoring ASCII case. Values are never inspected.

use serde_json::{Map, Value};

/// Placeholder written in place of a sensitive value.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Payload keys whose values are always redacted.
pub const SENSITIVE_KEYS: [&str; 7] =
    ["password", "secret", "key", "token", "auth", "email", "phone"];

/// Whether `key` names a sensitive field.
pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|s| s.eq_ignore_ascii_case(key))
}

/// Redact every sensitive key in `payload`, recursing into nested objects
/// and arrays.
pub fn redact(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let value = if is_sensitive(k) {
                    Value::String(REDACTED_MARKER.to_string())
                } else {
                    redact(v)
                };
                out.insert(k.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_top_level_and_nested() {
        let out = redact(&json!({
            "title": "hello",
            "Password": "hunter2",
            "user": {"EMAIL": "a@b.c", "name": "A"},
            "items": [{"token": "t"}, {"phone": 5}]
        }));
        assert_eq!(
            out,
            json!({
                "title": "hello",
                "Password": "[REDACTED]",
                "user": {"EMAIL": "[REDACTED]", "name": "A"},
                "items": [{"token": "[REDACTED]"}, {"phone": "[REDACTED]"}]
            })
        );
    }

    #[test]
    fn matches_exact_names_only() {
        let out = redact(&json!({"api_key": "x", "author": "y", "keyword": "z"}));
        assert_eq!(out, json!({"api_key": "x", "author": "y", "keyword": "z"}));
    }

    #[test]
    fn sensitive_object_is_replaced_whole() {
        let out = redact(&json!({"auth": {"user": "a", "pass": "b"}}));
        assert_eq!(out, json!({"auth": "[REDACTED]"}));
    }

    #[test]
    fn scalars_untouched() {
        assert_eq!(redact(&json!("password")), json!("password"));
        assert_eq!(redact(&Value::Null), Value::Null);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn payload() -> impl Strategy<Value = Value> {
            let key = prop_oneof![
                Just("password".to_string()),
                Just("Token".to_string()),
                Just("EMAIL".to_string()),
                "[a-z]{1,6}",
            ];
            let leaf = prop_oneof![
                any::<i64>().prop_map(Value::from),
                "[a-z ]{0,10}".prop_map(Value::from),
            ];
            leaf.prop_recursive(3, 24, 4, move |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                    proptest::collection::btree_map(key.clone(), inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn no_sensitive_values(v: &Value) -> bool {
            match v {
                Value::Object(map) => map.iter().all(|(k, v)| {
                    if is_sensitive(k) {
                        v == REDACTED_MARKER
                    } else {
                        no_sensitive_values(v)
                    }
                }),
                Value::Array(items) => items.iter().all(no_sensitive_values),
                _ => true,
            }
        }

        proptest! {
            #[test]
            fn every_sensitive_key_is_redacted(p in payload()) {
                prop_assert!(no_sensitive_values(&redact(&p)));
            }

            #[test]
            fn redaction_is_idempotent(p in payload()) {
                let once = redact(&p);
                prop_assert_eq!(redact(&once), once);
            }
        }
    }
}
