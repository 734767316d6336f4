//! Graph node model
//!
//! A node is `{id, kinds, properties}`. The id is the dedup key across
//! the whole run. Deserialization is tolerant of legacy checkpoint
//! inputs where the kind list was written as a single `kind` string.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A node in the output graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub kinds: Vec<String>,
    pub properties: Map<String, Value>,
}

impl Node {
    /// Create a node with the given id and kinds
    pub fn new(id: impl Into<String>, kinds: &[&str]) -> Self {
        Node {
            id: id.into(),
            kinds: kinds.iter().map(|k| k.to_string()).collect(),
            properties: Map::new(),
        }
    }

    /// Set a property, builder-style
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Set a property in place
    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Fetch a string property, empty if absent or not a string
    pub fn string_property(&self, key: &str) -> &str {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The downstream schema requires "kinds" as an array; empty
        // kinds and properties are omitted.
        let mut len = 1;
        if !self.kinds.is_empty() {
            len += 1;
        }
        if !self.properties.is_empty() {
            len += 1;
        }
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("id", &self.id)?;
        if !self.kinds.is_empty() {
            map.serialize_entry("kinds", &self.kinds)?;
        }
        if !self.properties.is_empty() {
            map.serialize_entry("properties", &self.properties)?;
        }
        map.end()
    }
}

/// Accepts a kind field written either as a string or a list of strings
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum KindsField {
    One(String),
    Many(Vec<String>),
}

impl From<KindsField> for Vec<String> {
    fn from(k: KindsField) -> Self {
        match k {
            KindsField::One(s) => vec![s],
            KindsField::Many(v) => v,
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            id: String,
            #[serde(default)]
            kind: Option<KindsField>,
            #[serde(default)]
            kinds: Option<KindsField>,
            #[serde(default)]
            properties: Map<String, Value>,
        }

        let raw = Raw::deserialize(deserializer)?;
        // Prefer "kinds", fall back to the legacy "kind"
        let kinds = raw
            .kinds
            .or(raw.kind)
            .map(Vec::from)
            .unwrap_or_default();

        Ok(Node {
            id: raw.id,
            kinds,
            properties: raw.properties,
        })
    }
}
