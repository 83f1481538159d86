//! Record wrapper with dot-notation field access.
//!
//! Records are JSON objects. Conditions and identify fields address them by
//! name; a dotted name like `actor.id` resolves a flat `"actor.id"` key first
//! and falls back to nested traversal.

use serde_json::{Map, Value};

/// A single input record: a JSON object of named fields.
pub type Record = Map<String, Value>;

/// A borrowed view of a record for field lookups during evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    inner: &'a Record,
}

impl<'a> Event<'a> {
    /// Wrap a record for field access.
    pub fn new(record: &'a Record) -> Self {
        Event { inner: record }
    }

    /// Get a field value by name, supporting dot-notation for nested access.
    ///
    /// Checks for a flat key first (exact match), then falls back to
    /// dot-separated traversal. When a path segment yields an array,
    /// each element is tried and the first match is returned.
    pub fn get_field(&self, path: &str) -> Option<&'a Value> {
        if let Some(v) = self.inner.get(path) {
            return Some(v);
        }

        if path.contains('.') {
            let parts: Vec<&str> = path.split('.').collect();
            let (head, rest) = parts.split_first()?;
            let root = self.inner.get(*head)?;
            return traverse(root, rest);
        }

        None
    }
}

/// Recursively traverse a JSON value following dot-notation path segments.
fn traverse<'a>(current: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    let Some((head, rest)) = parts.split_first() else {
        return Some(current);
    };

    match current {
        Value::Object(map) => traverse(map.get(*head)?, rest),
        Value::Array(arr) => arr.iter().find_map(|item| traverse(item, parts)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_flat_field() {
        let r = record(json!({"status": "start", "id": 7}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("status"), Some(&json!("start")));
        assert_eq!(event.get_field("id"), Some(&json!(7)));
    }

    #[test]
    fn test_nested_field() {
        let r = record(json!({"actor": {"id": "user123"}}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("actor.id"), Some(&json!("user123")));
    }

    #[test]
    fn test_flat_key_precedence() {
        let r = record(json!({"actor.id": "flat", "actor": {"id": "nested"}}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("actor.id"), Some(&json!("flat")));
    }

    #[test]
    fn test_null_value_is_present() {
        let r = record(json!({"cond": null}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("cond"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_field() {
        let r = record(json!({"foo": "bar"}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("missing"), None);
        assert_eq!(event.get_field("foo.bar"), None);
    }

    #[test]
    fn test_array_traversal() {
        let r = record(json!({"a": {"b": [{"x": 1}, {"c": "found"}]}}));
        let event = Event::new(&r);
        assert_eq!(event.get_field("a.b.c"), Some(&json!("found")));
    }
}
