//! Canonical JSON serialization used for hashing.
//!
//! Object keys sorted lexicographically, compact separators, UTF-8. This
//! transform must stay bit-identical between writer and verifier; treat
//! any change as a format version bump.

use serde_json::Value;

/// Serialize a JSON value in the stable, deterministic form that feeds
/// SHA-256. Idempotent: canonicalizing an already-canonical document
/// yields the same bytes.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(
                    &serde_json::to_string(key).expect("JSON string serialization is infallible"),
                );
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Null, booleans, numbers, and strings already have a single
        // compact rendering.
        leaf => out.push_str(&leaf.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively_and_strips_whitespace() {
        let value = json!({
            "zeta": {"b": 2, "a": 1},
            "alpha": [true, null, "x"],
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":[true,null,"x"],"zeta":{"a":1,"b":2}}"#
        );
    }

    #[test]
    fn escapes_strings_like_standard_json() {
        let value = json!({"k": "line\nbreak \"quoted\""});
        assert_eq!(
            canonical_json(&value),
            r#"{"k":"line\nbreak \"quoted\""}"#
        );
    }

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::Bool),
            any::<i64>().prop_map(|n| serde_json::Value::Number(n.into())),
            "[a-zA-Z0-9_ .-]{0,12}".prop_map(serde_json::Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent(value in arb_json()) {
            let once = canonical_json(&value);
            let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
            let twice = canonical_json(&reparsed);
            prop_assert_eq!(once, twice);
        }
    }
}
