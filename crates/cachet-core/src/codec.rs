// ── Byte codec ──
//
// Entities are persisted as JSON objects: the base `id` / `is_cached`
// fields followed by every declared field. Decoding starts from the
// type's default and applies whatever is present; absent, null or
// unconvertible fields keep their default and are logged.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::StoreError;

const ID_KEY: &str = "id";
const CACHED_KEY: &str = "is_cached";

/// Flatten an entity into its persisted record.
pub fn to_record<E: Entity>(entity: &E) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert(ID_KEY.into(), Value::String(entity.id().to_owned()));
    record.insert(CACHED_KEY.into(), Value::Bool(entity.is_cached()));
    for field in E::declared_fields() {
        record.insert(field.name().into(), field.get(entity));
    }
    record
}

/// Rebuild an entity from a persisted record.
///
/// A null is written through the field's setter only when the default for
/// that field is not itself null, so an `Option` defaulting to `Some` still
/// restores a saved `None`.
pub fn from_record<E: Entity>(record: &Map<String, Value>) -> E {
    let mut entity = E::default();
    let pristine = E::default();

    if let Some(Value::String(id)) = record.get(ID_KEY) {
        entity.set_id(id.clone());
    }
    if let Some(Value::Bool(cached)) = record.get(CACHED_KEY) {
        entity.meta_mut().is_cached = *cached;
    }

    for field in E::declared_fields() {
        match record.get(field.name()) {
            None => debug!(
                entity = E::type_name(),
                field = field.name(),
                "field absent from persisted record, keeping default"
            ),
            Some(Value::Null) if field.get(&pristine).is_null() => debug!(
                entity = E::type_name(),
                field = field.name(),
                "field is null in persisted record, keeping default"
            ),
            Some(Value::Null) => {
                if let Err(e) = field.set(&mut entity, Value::Null) {
                    debug!(
                        entity = E::type_name(),
                        field = field.name(),
                        error = %e,
                        "field is null in persisted record, keeping default"
                    );
                }
            }
            Some(value) => {
                if let Err(e) = field.set(&mut entity, value.clone()) {
                    warn!(
                        entity = E::type_name(),
                        field = field.name(),
                        error = %e,
                        "skipping undecodable field"
                    );
                }
            }
        }
    }
    entity
}

pub fn encode_entity<E: Entity>(entity: &E) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&to_record(entity))?)
}

pub fn decode_entity<E: Entity>(bytes: &[u8]) -> Result<E, StoreError> {
    let record: Map<String, Value> = serde_json::from_slice(bytes)?;
    Ok(from_record(&record))
}
