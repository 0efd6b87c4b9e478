// ── Wire mapper ──
//
// Turns a JSON:API document `{ data, included? }` into typed entities.
// Envelope problems are `WireFormat` errors; a resource object that cannot
// become the target entity is a `Mapping` error and fails the whole batch.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use cachet_api::ResourceObject;

use crate::entity::Entity;
use crate::error::{CoreError, MappingError};

/// A parsed top-level JSON:API document.
#[derive(Debug, Clone)]
pub struct WireDocument {
    data: Value,
    included: Vec<Value>,
}

impl WireDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::wire(format!("body is not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(mut document) = value else {
            return Err(CoreError::wire("document is not a JSON object"));
        };
        let data = document
            .remove("data")
            .ok_or_else(|| CoreError::wire("document has no 'data' member"))?;

        let included = match document.remove("included") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                warn!("ignoring non-array 'included' member");
                Vec::new()
            }
        };
        Ok(Self { data, included })
    }

    /// `true` when `data` is a list.
    pub fn is_collection(&self) -> bool {
        self.data.is_array()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Single-resource mode.
    pub fn entity<E: Entity>(&self) -> Result<E, CoreError> {
        match &self.data {
            Value::Object(_) => Ok(build::<E>(&self.data)?),
            Value::Array(_) => Err(CoreError::wire(
                "expected a single resource object, got a list",
            )),
            Value::Null => Err(CoreError::wire("'data' is null")),
            _ => Err(CoreError::wire("'data' is not a resource object")),
        }
    }

    /// List mode. Any element that fails aborts the batch.
    pub fn entities<E: Entity>(&self) -> Result<Vec<E>, CoreError> {
        let Value::Array(items) = &self.data else {
            return Err(CoreError::wire("expected a list of resource objects"));
        };
        let entities = items
            .iter()
            .map(build::<E>)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(entity = E::type_name(), count = entities.len(), "mapped resource list");
        Ok(entities)
    }

    /// Side-loaded resources. Elements that are not resource objects are
    /// skipped.
    pub fn included(&self) -> Vec<ResourceObject> {
        self.included
            .iter()
            .filter_map(|item| match ResourceObject::deserialize(item) {
                Ok(resource) => Some(resource),
                Err(e) => {
                    warn!(error = %e, "skipping malformed included resource");
                    None
                }
            })
            .collect()
    }

    /// Build every included resource of `E`'s type. Nothing is cached.
    pub fn included_entities<E: Entity>(&self) -> Result<Vec<E>, CoreError> {
        self.included()
            .iter()
            .filter(|resource| resource.kind == E::type_name())
            .map(|resource| E::from_wire_fragment(resource).map_err(CoreError::from))
            .collect()
    }
}

fn build<E: Entity>(value: &Value) -> Result<E, MappingError> {
    let resource =
        ResourceObject::deserialize(value).map_err(|e| MappingError::Malformed(e.to_string()))?;
    E::from_wire_fragment(&resource)
}

/// Parse `bytes` and build one entity.
pub fn map_one<E: Entity>(bytes: &[u8]) -> Result<E, CoreError> {
    WireDocument::from_slice(bytes)?.entity()
}

/// Parse `bytes` and build one entity per element of `data`.
pub fn map_many<E: Entity>(bytes: &[u8]) -> Result<Vec<E>, CoreError> {
    WireDocument::from_slice(bytes)?.entities()
}
