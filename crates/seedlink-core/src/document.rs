//! Command and reply documents.
//!
//! The connection core never interprets documents beyond a handful of typed
//! field reads (`ok`, `ismaster`, `hosts`, `databases`), so a `Document` is a
//! thin, insertion-ordered wrapper around a JSON object. Field order matters
//! for commands: the server dispatches on the first key.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered field/value document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, for constructing command documents inline.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Read a boolean field.
    ///
    /// Servers encode flags as either booleans or numbers (`ok: 1`), so any
    /// non-zero number reads as `true`. Missing or non-boolean fields yield
    /// `default`.
    pub fn get_bool(&self, field: &str, default: bool) -> bool {
        match self.0.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => default,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Read an array of strings. Returns `None` if the field is missing or is
    /// not an array; non-string elements are skipped.
    pub fn get_str_array(&self, field: &str) -> Option<Vec<&str>> {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// Read an array of sub-documents. Non-object elements are skipped.
    pub fn get_documents(&self, field: &str) -> Vec<Document> {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|obj| Document(obj.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Name of the first field; for a command document, the command name.
    pub fn first_key(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Wrap a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Missing fields index to `Value::Null`, mirroring `serde_json::Value`.
impl Index<&str> for Document {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.0.get(field).unwrap_or(&NULL)
    }
}
