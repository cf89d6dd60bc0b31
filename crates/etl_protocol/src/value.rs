//! The tagged-variant value type that crosses the Source -> Transform boundary.
//!
//! Dynamic/weakly typed records from JSON and CSV never leak past the
//! transform layer; every source converts into this enum rather than a
//! catch-all `serde_json::Value`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single field value as produced by a row source, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render as the string a source would have handed us, for coercion and
    /// for error messages. `Null` renders as an empty string, matching
    /// spec.md's "missing -> empty string" lookup rule.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// An unordered mapping from normalised header to primitive value.
///
/// Invariant: every `Record` presented to the transform layer has
/// string-keyed fields (already normalised); binary blobs are out of scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_raw_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut fields = BTreeMap::new();
        for (key, value) in pairs {
            let normalised = crate::naming::normalize_header(key.as_ref());
            fields.insert(normalised, value.into());
        }
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Lookup a source key; missing keys map to an empty string per spec.md §4.2.
    pub fn get_or_empty(&self, key: &str) -> Value {
        self.fields.get(key).cloned().unwrap_or(Value::Text(String::new()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_pairs_normalises_keys() {
        let record = Record::from_raw_pairs(vec![("Ordre Nr.", "42"), ("Dato", "2024-01-01")]);
        assert_eq!(record.get("ordre_nr"), Some(&Value::Text("42".into())));
    }

    #[test]
    fn missing_key_is_empty_string() {
        let record = Record::new();
        assert_eq!(record.get_or_empty("missing"), Value::Text(String::new()));
    }
}
