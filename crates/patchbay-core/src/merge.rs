//! Configuration merge semantics
//!
//! Deep merge of `b` into `a` as used by the config service: arrays
//! concatenate with duplicates removed, objects merge key-wise recursively,
//! scalars from `b` replace, and a `Null` in `b` keeps `a` untouched.

use serde_json::Value;

/// Merge `b` into `a`, returning the merged value
pub fn merge(a: Value, b: Value) -> Value {
    match b {
        Value::Null => a,
        Value::Array(b_items) => match a {
            Value::Array(mut items) => {
                for candidate in b_items {
                    if !items.contains(&candidate) {
                        items.push(candidate);
                    }
                }
                Value::Array(items)
            }
            // A scalar `a` is replaced by the incoming array.
            _ => Value::Array(b_items),
        },
        Value::Object(b_map) => {
            let mut map = match a {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            for (key, b_value) in b_map {
                let a_value = map.remove(&key).unwrap_or(Value::Null);
                map.insert(key, merge(a_value, b_value));
            }
            Value::Object(map)
        }
        scalar => match a {
            // Appending a scalar to an existing array keeps the array.
            Value::Array(mut items) => {
                if !items.contains(&scalar) {
                    items.push(scalar);
                }
                Value::Array(items)
            }
            _ => scalar,
        },
    }
}

/// Expand a dotted key path into a nested object holding `value`
///
/// `key_value_to_object("a.b.c", 7)` yields `{"a":{"b":{"c":7}}}`.
pub fn key_value_to_object(key: &str, value: Value) -> Value {
    key.rsplit('.').fold(value, |inner, part| {
        let mut map = serde_json::Map::new();
        map.insert(part.to_string(), inner);
        Value::Object(map)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_replace() {
        assert_eq!(merge(json!(1), json!(2)), json!(2));
        assert_eq!(merge(json!("a"), json!("b")), json!("b"));
        assert_eq!(merge(json!(true), json!(false)), json!(false));
    }

    #[test]
    fn null_keeps_existing() {
        assert_eq!(merge(json!({"a": 1}), Value::Null), json!({"a": 1}));
    }

    #[test]
    fn arrays_concatenate_without_duplicates() {
        assert_eq!(
            merge(json!([1, 2]), json!([2, 3])),
            json!([1, 2, 3])
        );
        assert_eq!(merge(json!([1]), json!(2)), json!([1, 2]));
        assert_eq!(merge(json!(1), json!([2])), json!([2]));
    }

    #[test]
    fn objects_merge_recursively() {
        let a = json!({"a": {"b": {"c": 7}}});
        let b = json!({"a": {"key3": 3}});
        assert_eq!(
            merge(a, b),
            json!({"a": {"b": {"c": 7}, "key3": 3}})
        );
    }

    #[test]
    fn accumulated_preserved_config_example() {
        // Preserve {a:{b:{c:7}}}, then {a:{key3:3}}, then a.b.c2 = {key4:"value4"}.
        let step1 = merge(Value::Null, json!({"a": {"b": {"c": 7}}}));
        let step2 = merge(step1, json!({"a": {"key3": 3}}));
        let step3 = merge(step2, key_value_to_object("a.b.c2", json!({"key4": "value4"})));
        assert_eq!(
            step3,
            json!({"a": {"b": {"c": 7, "c2": {"key4": "value4"}}, "key3": 3}})
        );
    }

    #[test]
    fn key_value_expansion() {
        assert_eq!(
            key_value_to_object("a.b.c", json!(7)),
            json!({"a": {"b": {"c": 7}}})
        );
        assert_eq!(key_value_to_object("a", json!(1)), json!({"a": 1}));
    }
}
