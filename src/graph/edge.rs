//! Graph edge model
//!
//! An edge connects two endpoints by value. An endpoint optionally
//! carries `match_by` ("id" or "name") and a kind filter for external
//! resolution. Deserialization accepts legacy endpoint encodings: a bare
//! string, or an object keyed by `value`, `id`, or `name`.

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A node reference inside an edge
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Endpoint {
    pub value: String,
    pub match_by: Option<String>,
    pub kind: Option<String>,
}

impl Endpoint {
    pub fn by_value(value: impl Into<String>) -> Self {
        Endpoint {
            value: value.into(),
            match_by: None,
            kind: None,
        }
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.value.is_empty() {
            map.serialize_entry("value", &self.value)?;
        }
        if let Some(m) = &self.match_by {
            map.serialize_entry("match_by", m)?;
        }
        if let Some(k) = &self.kind {
            map.serialize_entry("kind", k)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Obj {
                #[serde(default)]
                value: Option<String>,
                #[serde(default)]
                id: Option<String>,
                #[serde(default)]
                name: Option<String>,
                #[serde(default)]
                match_by: Option<String>,
                #[serde(default)]
                kind: Option<String>,
            },
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Ok(Endpoint::by_value(s)),
            Raw::Obj {
                value,
                id,
                name,
                match_by,
                kind,
            } => Ok(Endpoint {
                value: value.or(id).or(name).unwrap_or_default(),
                match_by,
                kind,
            }),
        }
    }
}

/// An edge (relationship) in the output graph.
///
/// Edges are not deduplicated by the store; the graph-building context
/// is responsible for avoiding semantic duplicates at the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub start: Endpoint,
    pub end: Endpoint,
    pub kind: String,
    pub properties: Map<String, Value>,
}

impl Edge {
    /// Create an edge between two node ids
    pub fn new(start: impl Into<String>, end: impl Into<String>, kind: impl Into<String>) -> Self {
        Edge {
            start: Endpoint::by_value(start),
            end: Endpoint::by_value(end),
            kind: kind.into(),
            properties: Map::new(),
        }
    }

    pub fn with_start_match_by(mut self, match_by: &str) -> Self {
        self.start.match_by = Some(match_by.to_string());
        self
    }

    pub fn with_end_match_by(mut self, match_by: &str) -> Self {
        self.end.match_by = Some(match_by.to_string());
        self
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }
}

impl Serialize for Edge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut len = 3;
        if !self.properties.is_empty() {
            len += 1;
        }
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("start", &self.start)?;
        map.serialize_entry("end", &self.end)?;
        map.serialize_entry("kind", &self.kind)?;
        if !self.properties.is_empty() {
            map.serialize_entry("properties", &self.properties)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Edge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            start: Endpoint,
            end: Endpoint,
            kind: String,
            #[serde(default)]
            properties: Map<String, Value>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Edge {
            start: raw.start,
            end: raw.end,
            kind: raw.kind,
            properties: raw.properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::kinds;

    #[test]
    fn test_edge_serialization() {
        let edge = Edge::new("SRV01", "srv01", kinds::EDGE_HOSTS_NETWORK_SHARE)
            .with_start_match_by("name")
            .with_end_match_by("id");

        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["start"]["value"], "SRV01");
        assert_eq!(json["start"]["match_by"], "name");
        assert_eq!(json["end"]["match_by"], "id");
        assert_eq!(json["kind"], "HostsNetworkShare");
        assert!(json.get("properties").is_none());
    }

    #[test]
    fn test_deserialize_string_endpoints() {
        let edge: Edge =
            serde_json::from_str(r#"{"start":"a","end":"b","kind":"Contains"}"#).unwrap();
        assert_eq!(edge.start.value, "a");
        assert_eq!(edge.end.value, "b");
    }

    #[test]
    fn test_deserialize_legacy_id_and_name_endpoints() {
        let edge: Edge = serde_json::from_str(
            r#"{"start":{"id":"a"},"end":{"name":"b","match_by":"name"},"kind":"Contains"}"#,
        )
        .unwrap();
        assert_eq!(edge.start.value, "a");
        assert_eq!(edge.end.value, "b");
        assert_eq!(edge.end.match_by.as_deref(), Some("name"));
    }

    #[test]
    fn test_roundtrip() {
        let edge = Edge::new("S-1-1-0", "\\\\srv\\data\\", kinds::EDGE_CAN_GENERIC_READ);
        let json = serde_json::to_string(&edge).unwrap();
        let back: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }
}
