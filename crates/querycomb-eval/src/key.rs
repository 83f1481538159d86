//! Session key extraction.

use serde_json::Value;

use crate::event::Event;

/// Joins identify-field values into a session key. Part of the storage wire
/// format.
pub const KEY_SEPARATOR: &str = ":";

/// Derives session keys from a fixed, ordered list of identify fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExtractor {
    fields: Vec<String>,
}

impl KeyExtractor {
    pub fn new(fields: Vec<String>) -> Self {
        KeyExtractor { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The session key for a record, or `None` if any identify field is
    /// missing or the joined key is empty.
    pub fn extract(&self, event: &Event) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            parts.push(key_part(event.get_field(field)?));
        }
        let key = parts.join(KEY_SEPARATOR);
        if key.is_empty() { None } else { Some(key) }
    }
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Numbers, booleans, arrays and objects render as compact JSON.
        other => other.to_string(),
    }
}
