//! Bounded value capture
//!
//! Renders arbitrary runtime values into a transmit-safe JSON tree.
//! Serialization is total: any failure degrades to a descriptor, never
//! an error. Sequences and mappings keep only their first N entries
//! (source order, no prioritization), and recursion past the depth
//! bound degrades to an opaque descriptor instead of running away on
//! self-referential input.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::CaptureConfig;

/// Characters kept of the textual fallback inside a
/// `serialization_error` descriptor.
const MAX_FALLBACK_CHARS: usize = 100;

/// Renders values under the configured bounds
#[derive(Debug, Clone)]
pub struct ValueSerializer {
    max_items: usize,
    max_repr: usize,
    max_depth: usize,
}

impl Default for ValueSerializer {
    fn default() -> Self {
        ValueSerializer::new(&CaptureConfig::default())
    }
}

impl ValueSerializer {
    pub fn new(config: &CaptureConfig) -> Self {
        ValueSerializer {
            max_items: config.max_items,
            max_repr: config.max_repr,
            max_depth: config.max_depth,
        }
    }

    /// Render a serde-serializable value. Never fails: values that do
    /// not survive structural serialization come back as a
    /// `serialization_error` descriptor.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Value {
        match serde_json::to_value(value) {
            Ok(v) => self.bound(v, 0),
            Err(e) => json!({
                "type": "serialization_error",
                "repr": truncate_chars(&e.to_string(), MAX_FALLBACK_CHARS),
            }),
        }
    }

    /// Render a value outside serde's reach as an opaque descriptor:
    /// type name, owning module, truncated default textual form, and a
    /// best-effort size when the caller knows one.
    pub fn serialize_opaque<T: std::fmt::Debug + ?Sized>(
        &self,
        value: &T,
        size: Option<usize>,
    ) -> Value {
        let full = std::any::type_name::<T>();
        let (module, type_name) = match full.rfind("::") {
            Some(idx) => (&full[..idx], &full[idx + 2..]),
            None => ("unknown", full),
        };
        json!({
            "type": type_name,
            "module": module,
            "repr": truncate_chars(&format!("{value:?}"), self.max_repr),
            "size": size,
        })
    }

    /// Apply breadth and depth bounds to an already-structural value.
    pub fn bound(&self, value: Value, depth: usize) -> Value {
        if depth >= self.max_depth {
            return self.depth_descriptor(&value);
        }
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .take(self.max_items)
                    .map(|v| self.bound(v, depth + 1))
                    .collect(),
            ),
            Value::Object(entries) => {
                let mut out = Map::new();
                for (k, v) in entries.into_iter().take(self.max_items) {
                    out.insert(k, self.bound(v, depth + 1));
                }
                Value::Object(out)
            }
            primitive => primitive,
        }
    }

    /// Opaque descriptor for a subtree below the recursion bound.
    fn depth_descriptor(&self, value: &Value) -> Value {
        let (kind, size) = match value {
            Value::Array(items) => ("sequence", Some(items.len())),
            Value::Object(entries) => ("mapping", Some(entries.len())),
            Value::String(_) => ("string", None),
            Value::Number(_) => ("number", None),
            Value::Bool(_) => ("boolean", None),
            Value::Null => ("null", None),
        };
        json!({
            "type": kind,
            "module": "json",
            "repr": truncate_chars(&value.to_string(), self.max_repr),
            "size": size,
        })
    }
}

/// Truncate on a character boundary; byte slicing would panic on
/// multi-byte input.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("this value refuses to serialize"))
        }
    }

    #[test]
    fn test_primitives_pass_through() {
        let s = ValueSerializer::default();
        assert_eq!(s.serialize(&42), json!(42));
        assert_eq!(s.serialize("hello"), json!("hello"));
        assert_eq!(s.serialize(&true), json!(true));
        assert_eq!(s.serialize(&Option::<i32>::None), Value::Null);
    }

    #[test]
    fn test_sequence_truncated_to_ten() {
        let s = ValueSerializer::default();
        let input: Vec<i64> = (0..100).collect();
        let out = s.serialize(&input);
        let items = out.as_array().unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[0], json!(0));
        assert_eq!(items[9], json!(9));
    }

    #[test]
    fn test_mapping_truncated_preserving_order() {
        let s = ValueSerializer::default();
        let mut map = Map::new();
        for i in 0..25 {
            map.insert(format!("key_{i:02}"), json!(i));
        }
        let out = s.bound(Value::Object(map), 0);
        let entries = out.as_object().unwrap();
        assert_eq!(entries.len(), 10);
        let keys: Vec<&String> = entries.keys().collect();
        assert_eq!(keys[0], "key_00");
        assert_eq!(keys[9], "key_09");
    }

    #[test]
    fn test_depth_bound_degrades_to_descriptor() {
        let s = ValueSerializer::default();
        // Build nesting deeper than the default bound of 16.
        let mut v = json!([1]);
        for _ in 0..40 {
            v = json!([v]);
        }
        let out = s.bound(v, 0);
        // Walk down: at the bound we must find a descriptor object.
        let mut cur = &out;
        let mut saw_descriptor = false;
        for _ in 0..41 {
            match cur {
                Value::Array(items) => cur = &items[0],
                Value::Object(o) => {
                    assert_eq!(o["type"], "sequence");
                    assert_eq!(o["module"], "json");
                    saw_descriptor = true;
                    break;
                }
                other => panic!("unexpected node: {other}"),
            }
        }
        assert!(saw_descriptor);
    }

    #[test]
    fn test_serialization_failure_degrades() {
        let s = ValueSerializer::default();
        let out = s.serialize(&Unserializable);
        assert_eq!(out["type"], "serialization_error");
        let repr = out["repr"].as_str().unwrap();
        assert!(!repr.is_empty());
        assert!(repr.chars().count() <= MAX_FALLBACK_CHARS);
    }

    #[test]
    fn test_opaque_descriptor() {
        let s = ValueSerializer::default();
        let value = std::time::Duration::from_millis(5);
        let out = s.serialize_opaque(&value, None);
        assert_eq!(out["type"], "Duration");
        assert!(out["module"].as_str().unwrap().contains("time"));
        assert_eq!(out["repr"], "5ms");
        assert_eq!(out["size"], Value::Null);
    }

    #[test]
    fn test_opaque_repr_capped() {
        let config = CaptureConfig {
            max_repr: 8,
            ..CaptureConfig::default()
        };
        let s = ValueSerializer::new(&config);
        let long = "x".repeat(500);
        let out = s.serialize_opaque(long.as_str(), Some(500));
        assert_eq!(out["repr"].as_str().unwrap().len(), 8);
        assert_eq!(out["size"], json!(500));
    }

    #[test]
    fn test_nested_values_bounded_recursively() {
        let s = ValueSerializer::default();
        let inner: Vec<i64> = (0..50).collect();
        let out = s.serialize(&vec![inner.clone(), inner]);
        let outer = out.as_array().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0].as_array().unwrap().len(), 10);
    }
}
