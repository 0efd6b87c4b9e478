// ── Model cache ──
//
// Typed, partitioned, in-memory store of entities with whole-cache
// persistence. One partition per registered type, keyed by id. Every
// `add` is an upsert and fires a change event after the partition lock
// has been released.

pub(crate) mod partition;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bus::{ChangeBus, ChangeEvent};
use crate::entity::{Entity, Relationship, TypeDescriptor};
use crate::error::CoreError;
use crate::persist::{MemoryStore, PersistentStore};

use self::partition::{AnyPartition, Partition};

/// Lifecycle of one type's partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Unregistered,
    /// Registered but holding no instances.
    Registered,
    Populated,
}

/// The process-wide model cache.
///
/// Safe to share behind an `Arc`. Reads return `Arc` snapshots of the
/// stored entities; mutation is always a whole-entity replacement.
pub struct ModelCache {
    registry: ArcSwap<Vec<TypeDescriptor>>,
    partitions: DashMap<&'static str, Box<dyn AnyPartition>>,
    bus: ChangeBus,
    store: Arc<dyn PersistentStore>,
    /// Serializes save/load/clear against each other.
    persistence: Mutex<()>,
}

impl ModelCache {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            registry: ArcSwap::from_pointee(Vec::new()),
            partitions: DashMap::new(),
            bus: ChangeBus::new(),
            store,
            persistence: Mutex::new(()),
        }
    }

    /// A cache persisting to process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    // ── Registry ─────────────────────────────────────────────────────

    /// Declare the entity types this cache may hold. Idempotent.
    ///
    /// # Panics
    ///
    /// If a type name is already registered to a different Rust type.
    pub fn register(&self, types: &[TypeDescriptor]) {
        let before = self.registry.load().len();
        self.registry.rcu(|current| {
            let mut next = Vec::clone(current);
            for desc in types {
                match next.iter().find(|d| d.name() == desc.name()) {
                    Some(existing) if existing.type_id() != desc.type_id() => panic!(
                        "entity type name '{}' is registered to two different types",
                        desc.name()
                    ),
                    Some(_) => {}
                    None => next.push(*desc),
                }
            }
            next
        });
        let after = self.registry.load().len();
        if after > before {
            debug!(added = after - before, total = after, "entity types registered");
        }
    }

    pub fn register_type<E: Entity>(&self) {
        self.register(&[E::descriptor()]);
    }

    pub fn is_registered<E: Entity>(&self) -> bool {
        self.registry.load().iter().any(TypeDescriptor::is::<E>)
    }

    pub fn registered_types(&self) -> Vec<TypeDescriptor> {
        Vec::clone(&self.registry.load())
    }

    pub fn state<E: Entity>(&self) -> PartitionState {
        if !self.is_registered::<E>() {
            PartitionState::Unregistered
        } else if self.len::<E>() == 0 {
            PartitionState::Registered
        } else {
            PartitionState::Populated
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Upsert `entity`, marking it cached. Returns `true` if its id was new.
    ///
    /// Fires `Added` or `Updated` on the change bus.
    ///
    /// # Panics
    ///
    /// If `E` was never registered. Nothing is stored in that case.
    pub fn add<E: Entity>(&self, entity: E) -> bool {
        self.put(entity).1
    }

    /// Like [`add`](Self::add), also returning the stored snapshot.
    pub fn put<E: Entity>(&self, mut entity: E) -> (Arc<E>, bool) {
        self.assert_registered::<E>();

        entity.meta_mut().is_cached = true;
        let entity = Arc::new(entity);

        let is_new = {
            let mut slot = self
                .partitions
                .entry(E::type_name())
                .or_insert_with(Partition::<E>::boxed);
            downcast_mut::<E>(slot.value_mut()).upsert(Arc::clone(&entity))
        };

        debug!(entity = E::type_name(), id = entity.id(), is_new, "entity cached");

        let event = if is_new {
            ChangeEvent::Added(Arc::clone(&entity))
        } else {
            ChangeEvent::Updated(Arc::clone(&entity))
        };
        self.bus.publish(&event);

        (entity, is_new)
    }

    /// Insert `entity` unless it is already a cached snapshot.
    ///
    /// An entity whose `is_cached` flag is set came out of this cache and is
    /// skipped: nothing is stored, no event fires and `false` is returned.
    /// Anything else goes through [`add`](Self::add).
    pub fn add_if_uncached<E: Entity>(&self, entity: E) -> bool {
        if entity.is_cached() {
            debug!(entity = E::type_name(), id = entity.id(), "already cached, skipping");
            return false;
        }
        self.add(entity)
    }

    /// Add every entity in order. Returns how many ids were new.
    pub fn add_all<E: Entity>(&self, entities: impl IntoIterator<Item = E>) -> usize {
        entities
            .into_iter()
            .map(|e| self.add(e))
            .filter(|is_new| *is_new)
            .count()
    }

    /// Evict one instance from memory. No event is fired.
    pub fn remove<E: Entity>(&self, id: &str) -> Option<Arc<E>> {
        let mut slot = self.partitions.get_mut(E::type_name())?;
        let removed = slot
            .value_mut()
            .as_any_mut()
            .downcast_mut::<Partition<E>>()?
            .remove(id);
        if removed.is_some() {
            debug!(entity = E::type_name(), id, "entity evicted");
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Every cached instance of `E`, in no particular order.
    pub fn get_all<E: Entity>(&self) -> Vec<Arc<E>> {
        self.with_partition::<E, _>(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_map<E: Entity>(&self) -> HashMap<String, Arc<E>> {
        self.with_partition::<E, _>(|p| {
            p.entries()
                .map(|(id, e)| (id.clone(), Arc::clone(e)))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn get_by_id<E: Entity>(&self, id: &str) -> Option<Arc<E>> {
        self.with_partition::<E, _>(|p| p.get(id)).flatten()
    }

    pub fn len<E: Entity>(&self) -> usize {
        self.with_partition::<E, _>(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty<E: Entity>(&self) -> bool {
        self.len::<E>() == 0
    }

    /// Instances whose declared field `field_name` (or `"id"`) equals
    /// `value`. Unknown fields and type-mismatched values match nothing.
    pub fn search<E: Entity>(&self, field_name: &str, value: impl Into<Value>) -> Vec<Arc<E>> {
        let value = value.into();
        if field_name == "id" {
            let Some(id) = value.as_str() else {
                return Vec::new();
            };
            return self.get_by_id::<E>(id).into_iter().collect();
        }

        let Some(field) = E::declared_fields()
            .into_iter()
            .find(|f| f.name() == field_name)
        else {
            debug!(entity = E::type_name(), field = field_name, "search on undeclared field");
            return Vec::new();
        };
        self.filter::<E>(|entity| field.get(entity) == value)
    }

    /// Instances matching an arbitrary predicate.
    ///
    /// The predicate runs on a snapshot, so it may itself read or write the
    /// cache.
    pub fn filter<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Vec<Arc<E>> {
        self.get_all::<E>()
            .into_iter()
            .filter(|e| predicate(e.as_ref()))
            .collect()
    }

    /// Follow a relationship to its cached target.
    pub fn resolve<E: Entity>(&self, relationship: &Relationship) -> Option<Arc<E>> {
        if !relationship.kind.is::<E>() {
            return None;
        }
        self.get_by_id::<E>(&relationship.id)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write every registered partition to the store. Registered types with
    /// no instances are written as empty partitions.
    pub fn save(&self) -> Result<(), CoreError> {
        let _guard = self.persistence.lock().unwrap_or_else(PoisonError::into_inner);

        let registry = self.registry.load();
        for desc in registry.iter() {
            let bytes = {
                let slot = self
                    .partitions
                    .entry(desc.name())
                    .or_insert_with(desc.new_partition);
                slot.encode()?
            };
            self.store.write(desc.name(), &bytes)?;
        }

        info!(types = registry.len(), "model cache saved");
        Ok(())
    }

    /// Replace in-memory partitions with what the store holds.
    ///
    /// Failures are logged per type and never abort the load. Returns the
    /// number of partitions restored. Fires no events.
    pub fn load(&self) -> usize {
        let _guard = self.persistence.lock().unwrap_or_else(PoisonError::into_inner);

        let mut restored = 0;
        for desc in self.registry.load().iter() {
            match self.store.read(desc.name()) {
                Ok(Some(bytes)) => match (desc.decode_partition)(&bytes) {
                    Ok(partition) => {
                        debug!(entity = desc.name(), len = partition.len(), "partition restored");
                        self.partitions.insert(desc.name(), partition);
                        restored += 1;
                    }
                    Err(e) => {
                        warn!(entity = desc.name(), error = %e, "failed to decode persisted partition");
                    }
                },
                Ok(None) => debug!(entity = desc.name(), "nothing persisted"),
                Err(e) => {
                    warn!(entity = desc.name(), error = %e, "failed to read persisted partition");
                }
            }
        }

        info!(restored, "model cache loaded");
        restored
    }

    /// Drop every in-memory partition. The store is left untouched.
    pub fn clear(&self) {
        let _guard = self.persistence.lock().unwrap_or_else(PoisonError::into_inner);
        self.partitions.clear();
        debug!("model cache cleared");
    }

    /// Drop the in-memory partition of a single type.
    pub fn clear_type<E: Entity>(&self) {
        let _guard = self.persistence.lock().unwrap_or_else(PoisonError::into_inner);
        self.partitions.remove(E::type_name());
    }

    // ── Internals ────────────────────────────────────────────────────

    fn assert_registered<E: Entity>(&self) {
        let registry = self.registry.load();
        match registry.iter().find(|d| d.name() == E::type_name()) {
            Some(desc) if desc.is::<E>() => {}
            Some(_) => panic!(
                "entity type name '{}' belongs to a different registered type",
                E::type_name()
            ),
            None => panic!(
                "entity type '{}' was not registered with the model cache",
                E::type_name()
            ),
        }
    }

    fn with_partition<E: Entity, R>(&self, f: impl FnOnce(&Partition<E>) -> R) -> Option<R> {
        let slot = self.partitions.get(E::type_name())?;
        let partition = slot.value().as_any().downcast_ref::<Partition<E>>()?;
        Some(f(partition))
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.registry.load().iter().map(TypeDescriptor::name).collect();
        f.debug_struct("ModelCache")
            .field("types", &names)
            .field("partitions", &self.partitions.len())
            .finish_non_exhaustive()
    }
}

fn downcast_mut<E: Entity>(partition: &mut Box<dyn AnyPartition>) -> &mut Partition<E> {
    match partition.as_any_mut().downcast_mut::<Partition<E>>() {
        Some(p) => p,
        None => panic!("partition '{}' holds a different entity type", E::type_name()),
    }
}
