//! Flat documents: a JSON object of scalar fields.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A scalar field value. Serializes as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl FieldValue {
    /// Text handed to the embedding model.
    pub fn to_indexable(&self) -> String {
        self.to_string()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// Named field values, kept in field-name order. Each field is indexed into
/// its own column; the whole document is stored for hydration.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Parse one JSON object. Nested arrays and objects are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct DocumentBuilder {
    fields: BTreeMap<String, FieldValue>,
}

impl DocumentBuilder {
    /// Set `name`, replacing any earlier value.
    pub fn add<S: Into<String>, V: Into<FieldValue>>(mut self, name: S, value: V) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn add_text<S: Into<String>, T: Into<String>>(self, name: S, value: T) -> Self {
        self.add(name, FieldValue::Text(value.into()))
    }

    pub fn add_integer<S: Into<String>>(self, name: S, value: i64) -> Self {
        self.add(name, FieldValue::Integer(value))
    }

    pub fn build(self) -> Document {
        Document {
            fields: self.fields,
        }
    }
}
