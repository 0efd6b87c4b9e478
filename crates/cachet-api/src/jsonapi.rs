// ── JSON:API wire types ──
//
// Resource objects and identifiers as they appear on the wire. The
// top-level document is left to the caller to validate so that a broken
// envelope and a broken resource can be reported differently.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

/// `{ "type": ..., "id": ... }` pointer to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A single JSON:API resource object.
///
/// `relationships` keeps the raw relationship objects so that a missing
/// linkage can be reported per key instead of failing the whole resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "optional_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub relationships: Map<String, Value>,
}

impl ResourceObject {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Add a to-one relationship `{ "data": { "id", "type" } }`.
    pub fn with_relationship(mut self, key: impl Into<String>, target: &ResourceIdentifier) -> Self {
        self.relationships
            .insert(key.into(), json!({ "data": target }));
        self
    }

    /// The resource's JSON view, used for path-based extraction.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Linkage of a to-one relationship, if present and well-formed.
    pub fn relationship(&self, key: &str) -> Option<ResourceIdentifier> {
        let data = self.relationships.get(key)?.get("data")?;
        let kind = data.get("type").and_then(Value::as_str).unwrap_or_default();
        let id = match data.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(ResourceIdentifier::new(kind, id))
    }

    /// Linkages of a to-many relationship. Malformed entries are skipped.
    pub fn relationship_many(&self, key: &str) -> Vec<ResourceIdentifier> {
        self.relationships
            .get(key)
            .and_then(|rel| rel.get("data"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wrap this resource in a `{ "data": ... }` request document.
    pub fn into_document(self) -> Value {
        json!({ "data": self })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string id, got {other}"
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string id, got {other}"
        ))),
    }
}
