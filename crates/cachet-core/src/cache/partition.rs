// ── Per-type partition ──
//
// The map `id -> entity` for a single entity type, plus the type-erased
// surface the cache needs to persist and restore it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::codec;
use crate::entity::Entity;
use crate::error::StoreError;

/// Operations the cache performs without knowing the entity type.
pub(crate) trait AnyPartition: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn len(&self) -> usize;

    /// Serialize to a JSON object of `id -> persisted record`.
    fn encode(&self) -> Result<Vec<u8>, StoreError>;
}

pub(crate) struct Partition<E: Entity> {
    by_id: HashMap<String, Arc<E>>,
}

impl<E: Entity> Partition<E> {
    pub(crate) fn new() -> Self {
        Self {
            by_id: HashMap::new(),
        }
    }

    pub(crate) fn boxed() -> Box<dyn AnyPartition> {
        Box::new(Self::new())
    }

    /// Restore a partition written by [`AnyPartition::encode`].
    ///
    /// Records that are not JSON objects are skipped. Every restored entity
    /// is marked cached; a record with an empty id takes its map key.
    pub(crate) fn decode_boxed(bytes: &[u8]) -> Result<Box<dyn AnyPartition>, StoreError> {
        let records: Value = serde_json::from_slice(bytes)?;
        let Value::Object(records) = records else {
            return Err(StoreError::Corrupt {
                key: E::type_name().to_owned(),
            });
        };

        let mut partition = Self::new();
        for (key, record) in records {
            let Value::Object(record) = record else {
                warn!(entity = E::type_name(), id = %key, "skipping non-object persisted record");
                continue;
            };
            let mut entity: E = codec::from_record(&record);
            if entity.id().is_empty() {
                entity.set_id(key.clone());
            }
            entity.meta_mut().is_cached = true;
            partition.by_id.insert(key, Arc::new(entity));
        }
        Ok(Box::new(partition))
    }

    /// Insert or replace by id. Returns `true` if the id was new.
    pub(crate) fn upsert(&mut self, entity: Arc<E>) -> bool {
        self.by_id
            .insert(entity.id().to_owned(), entity)
            .is_none()
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<E>> {
        self.by_id.get(id).cloned()
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<E>> {
        self.by_id.remove(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<E>> {
        self.by_id.values()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &Arc<E>)> {
        self.by_id.iter()
    }
}

impl<E: Entity> AnyPartition for Partition<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let records: Map<String, Value> = self
            .by_id
            .iter()
            .map(|(id, entity)| (id.clone(), Value::Object(codec::to_record(entity.as_ref()))))
            .collect();
        Ok(serde_json::to_vec(&records)?)
    }
}
